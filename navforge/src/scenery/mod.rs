//! Scenery area descriptor.
//!
//! Binary scenery sources are organized into areas: directories of
//! archive files with a layer priority. The descriptor is an INI file:
//!
//! ```ini
//! [area.1]
//! title = Base Scenery
//! local_path = Scenery/Base
//! layer = 1
//! active = true
//!
//! [area.2]
//! title = Addon Airports
//! local_path = Addon Scenery
//! layer = 40
//! active = true
//! ```
//!
//! Areas are scanned in (layer, area number) order so that add-on content
//! loads after the base content it overrides; the deduplication pass
//! later keeps the newest row per identity. Disabled areas are skipped
//! entirely.

use std::path::{Path, PathBuf};

use ini::Ini;

/// Errors while reading or validating the scenery descriptor.
#[derive(Debug, thiserror::Error)]
pub enum SceneryConfigError {
    #[error("scenery configuration not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to parse scenery configuration: {0}")]
    Parse(#[from] ini::Error),

    #[error("scenery configuration \"{0}\" does not contain any scenery areas")]
    NoAreas(PathBuf),

    #[error("invalid value in [{section}]: {key} = '{value}'")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },

    #[error("required directory missing: {0}")]
    DirectoryMissing(PathBuf),
}

/// One scenery area from the descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneryArea {
    pub area_number: i32,
    pub layer: i32,
    pub title: String,
    pub local_path: PathBuf,
    pub active: bool,
}

impl SceneryArea {
    /// A synthetic single area for sources without a descriptor
    /// (relational and text-line compiles).
    pub fn synthetic(area_number: i32, title: &str) -> Self {
        Self {
            area_number,
            layer: 0,
            title: title.to_string(),
            local_path: PathBuf::new(),
            active: true,
        }
    }
}

/// The parsed scenery descriptor.
#[derive(Debug, Clone, Default)]
pub struct SceneryConfig {
    areas: Vec<SceneryArea>,
}

impl SceneryConfig {
    /// Reads and orders a descriptor file.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, SceneryConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SceneryConfigError::NotFound(path.to_path_buf()));
        }
        let ini = Ini::load_from_file(path)?;
        let config = Self::from_ini(&ini)?;
        if config.areas.is_empty() {
            return Err(SceneryConfigError::NoAreas(path.to_path_buf()));
        }
        Ok(config)
    }

    /// Parses areas out of `[area.N]` sections and sorts them.
    pub fn from_ini(ini: &Ini) -> Result<Self, SceneryConfigError> {
        let mut areas = Vec::new();

        for (section, props) in ini.iter() {
            let Some(section) = section else { continue };
            let Some(number) = section.strip_prefix("area.") else {
                continue;
            };
            let area_number: i32 =
                number
                    .parse()
                    .map_err(|_| SceneryConfigError::InvalidValue {
                        section: section.to_string(),
                        key: "area number".to_string(),
                        value: number.to_string(),
                    })?;

            let layer = match props.get("layer") {
                Some(v) => v.parse().map_err(|_| SceneryConfigError::InvalidValue {
                    section: section.to_string(),
                    key: "layer".to_string(),
                    value: v.to_string(),
                })?,
                None => area_number,
            };

            let active = match props.get("active").unwrap_or("true") {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                other => {
                    return Err(SceneryConfigError::InvalidValue {
                        section: section.to_string(),
                        key: "active".to_string(),
                        value: other.to_string(),
                    })
                }
            };

            areas.push(SceneryArea {
                area_number,
                layer,
                title: props.get("title").unwrap_or(section).to_string(),
                local_path: PathBuf::from(props.get("local_path").unwrap_or("")),
                active,
            });
        }

        areas.sort_by(|a, b| {
            a.layer
                .cmp(&b.layer)
                .then(a.area_number.cmp(&b.area_number))
        });
        Ok(Self { areas })
    }

    /// All areas in scan order.
    pub fn areas(&self) -> &[SceneryArea] {
        &self.areas
    }

    /// Active areas in scan order.
    pub fn active_areas(&self) -> impl Iterator<Item = &SceneryArea> {
        self.areas.iter().filter(|a| a.active)
    }
}

/// Checks that a source base path carries the expected layout.
///
/// Missing directories are fatal resource errors.
pub fn check_base_path(base: &Path) -> Result<(), SceneryConfigError> {
    if !base.is_dir() {
        return Err(SceneryConfigError::DirectoryMissing(base.to_path_buf()));
    }
    Ok(())
}
