//! The compilation driver.

use std::path::Path;

use rusqlite::Connection;

use crate::airway::AirwayResolver;
use crate::bgl::BglWriter;
use crate::db::{self, schema, scripts, DatabaseMeta};
use crate::dfd::DfdCompiler;
use crate::magdec::MagDecReader;
use crate::scenery::SceneryConfig;
use crate::textsource::TextCompiler;
use crate::util::AirportIndex;

use super::{
    CompileError, NavCompileOptions, ProgressHandler, ResultFlags, SceneryAreaErrors,
    SceneryErrors, SourceKind,
};

/// Orchestrates one compilation run against an open output store.
///
/// Phases run in a fixed order and each commits before the next begins.
/// Cancellation is checked at every phase boundary; an abort rolls back
/// the phase in flight, leaves earlier committed phases untouched and
/// surfaces [`ResultFlags::aborted`].
pub struct NavDatabase<'a> {
    options: &'a NavCompileOptions,
    progress: ProgressHandler<'a>,
    errors: SceneryErrors,
    aborted: bool,
}

impl<'a> NavDatabase<'a> {
    pub fn new(options: &'a NavCompileOptions) -> Self {
        Self::with_progress(options, ProgressHandler::new(None))
    }

    pub fn with_progress(options: &'a NavCompileOptions, progress: ProgressHandler<'a>) -> Self {
        Self {
            options,
            progress,
            errors: SceneryErrors::default(),
            aborted: false,
        }
    }

    /// Per-file errors collected during the run.
    pub fn errors(&self) -> &SceneryErrors {
        &self.errors
    }

    /// Runs the full compile.
    pub fn create(&mut self, conn: &mut Connection) -> Result<ResultFlags, CompileError> {
        let mut result = ResultFlags::default();
        let start = std::time::Instant::now();

        self.aborted = false;
        self.progress.set_total(self.count_steps());
        self.progress.reset();

        self.create_schema(conn)?;
        if self.aborted {
            result.aborted = true;
            return Ok(result);
        }

        // Magnetic model is loaded once and pinned for the run
        let magdec = match &self.options.magdec_path {
            Some(path) => MagDecReader::read_from_file(path)?,
            None => MagDecReader::from_uniform(0.0),
        };

        let airac = match &self.options.source {
            SourceKind::Dfd { source_db } => self.load_dfd(conn, &magdec, source_db)?,
            SourceKind::BglScenery {
                base_path,
                scenery_config,
            } => {
                self.load_bgl(conn, &magdec, base_path, scenery_config, &mut result)?;
                None
            }
            SourceKind::TextLine { base_path } => {
                self.load_textline(conn, &magdec, base_path)?;
                None
            }
        };
        if self.aborted {
            result.aborted = true;
            return Ok(result);
        }

        // Cross-reference scripts: resolve the string identifiers the
        // adapters stored into integer foreign keys
        let xref_phases: [(&str, fn(&Connection) -> rusqlite::Result<()>); 6] = [
            ("Updating waypoints", scripts::update_waypoint_nav_ids),
            ("Updating navaids", scripts::update_navaid_airport_ids),
            ("Updating approaches", scripts::update_approaches),
            ("Updating airports", scripts::update_airport_regions),
            ("Updating ILS", scripts::update_ils_ids),
            ("Updating ILS count", scripts::update_num_ils),
        ];
        for (message, script) in xref_phases {
            self.run_phase(conn, message, |conn| Ok(script(conn)?))?;
        }

        if matches!(self.options.source, SourceKind::Dfd { .. }) {
            // Remove unreferenced dummy waypoints added for airway
            // generation
            self.run_phase(conn, "Cleaning up waypoints", |conn| {
                Ok(scripts::clean_waypoints(conn)?)
            })?;
        }

        self.run_phase(conn, "Collecting navaids for search", |conn| {
            Ok(scripts::populate_nav_search(conn)?)
        })?;

        if self.options.create_route_tables {
            self.run_phase(conn, "Populating routing tables", |conn| {
                Ok(scripts::populate_route_nodes(conn)?)
            })?;
            self.run_phase(conn, "Creating route edges for VOR and NDB", |conn| {
                scripts::write_route_edges_radio(conn)?;
                Ok(())
            })?;
            self.run_phase(conn, "Creating route edges for waypoints", |conn| {
                Ok(scripts::populate_route_edges_airway(conn)?)
            })?;
        }

        // Final index wave
        self.run_phase(conn, "Creating indexes for airport", |conn| {
            Ok(schema::create_indexes_airport(conn)?)
        })?;
        self.run_phase(conn, "Creating indexes for search", |conn| {
            Ok(schema::create_indexes_search(conn)?)
        })?;
        if self.options.create_route_tables {
            self.run_phase(conn, "Creating indexes for route", |conn| {
                Ok(schema::create_indexes_route(conn)?)
            })?;
        }
        if self.aborted {
            result.aborted = true;
            return Ok(result);
        }

        // Run metadata
        let mut meta = DatabaseMeta::new();
        meta.set_data_source(match self.options.source {
            SourceKind::BglScenery { .. } => "BGL",
            SourceKind::Dfd { .. } => "DFD",
            SourceKind::TextLine { .. } => "TEXT",
        });
        if let Some((cycle, valid_through)) = airac {
            meta.set_airac_cycle(Some(cycle), valid_through);
        }
        meta.set_compiler_version(&format!("navforge {}", crate::VERSION));
        meta.update_all(conn)?;

        if self.options.basic_validation && !self.basic_validation(conn)? {
            result.basic_validation_error = true;
        }

        // Vacuum and analyze run outside any transaction
        if self.options.vacuum && !self.report("Vacuum database") {
            conn.execute_batch("vacuum")?;
        }
        if self.options.analyze && !self.report("Analyze database") {
            conn.execute_batch("analyze")?;
        }
        if self.aborted {
            result.aborted = true;
            return Ok(result);
        }

        self.progress.report_finish();
        tracing::info!(
            elapsed_s = start.elapsed().as_secs(),
            file_errors = self.errors.total_errors(),
            "Compilation finished"
        );
        Ok(result)
    }

    /// Drops and recreates all schema objects.
    fn create_schema(&mut self, conn: &Connection) -> Result<(), CompileError> {
        let drop_phases: [(&str, fn(&Connection) -> rusqlite::Result<()>); 7] = [
            ("Removing views", schema::drop_views),
            ("Removing routing and search", schema::drop_routing_and_search),
            ("Removing navigation aids", schema::drop_nav),
            ("Removing airport facilities", schema::drop_airport_facilities),
            ("Removing approaches", schema::drop_approach),
            ("Removing airports", schema::drop_airport),
            ("Removing metadata", schema::drop_meta),
        ];
        for (message, script) in drop_phases {
            self.run_phase(conn, message, |conn| Ok(script(conn)?))?;
        }
        self.run_phase(conn, "Creating database schema", |conn| {
            Ok(schema::create_schema(conn)?)
        })?;
        Ok(())
    }

    /// Relational source flow. Returns the AIRAC cycle for the metadata.
    fn load_dfd(
        &mut self,
        conn: &Connection,
        magdec: &MagDecReader,
        source_db: &Path,
    ) -> Result<Option<(String, Option<String>)>, CompileError> {
        if !source_db.is_file() {
            return Err(CompileError::SourceNotFound(source_db.to_path_buf()));
        }

        let mut compiler = DfdCompiler::new(conn, magdec);
        compiler.set_max_airway_segment_nm(self.options.airway_max_length_nm());
        compiler.attach_database(&source_db.display().to_string())?;

        let load_result = self.load_dfd_inner(conn, magdec, &mut compiler);
        let airac = compiler
            .airac_cycle()
            .map(|c| (c.to_string(), compiler.valid_through().map(String::from)));

        // The attachment is held by prepared queries, close late but
        // always
        compiler.close()?;
        load_result?;
        Ok(airac)
    }

    fn load_dfd_inner(
        &mut self,
        conn: &Connection,
        magdec: &MagDecReader,
        compiler: &mut DfdCompiler,
    ) -> Result<(), CompileError> {
        compiler.read_header()?;

        self.run_phase(conn, "Writing magnetic declination table", |conn| {
            Ok(magdec.write_to_table(conn)?)
        })?;

        let load_phases: [(&str, fn(&mut DfdCompiler) -> rusqlite::Result<()>); 6] = [
            ("Writing scenery metadata", |c| c.write_file_and_scenery_metadata()),
            ("Writing airports", |c| c.write_airports()),
            ("Writing runways", |c| c.write_runways()),
            ("Writing navaids", |c| c.write_navaids()),
            ("Writing airspaces", |c| c.write_airspaces()),
            ("Writing COM frequencies", |c| c.write_com()),
        ];
        for (message, phase) in load_phases {
            if self.report(message) {
                return Ok(());
            }
            conn.execute_batch("begin")?;
            match phase(compiler) {
                Ok(()) => conn.execute_batch("commit")?,
                Err(e) => {
                    let _ = conn.execute_batch("rollback");
                    return Err(e.into());
                }
            }
        }

        if self.post_load_indexes_and_dedup(conn)? {
            return Ok(());
        }

        if self.report("Writing airways") {
            return Ok(());
        }
        conn.execute_batch("begin")?;
        match compiler.write_airways() {
            Ok(()) => conn.execute_batch("commit")?,
            Err(e) => {
                let _ = conn.execute_batch("rollback");
                return Err(e.into());
            }
        }

        // Create waypoints for fix resolution in procedures; has to be
        // done after airway processing and before the procedure writer
        self.run_phase(conn, "Creating waypoints for procedures", |_| {
            Ok(compiler.create_waypoints_for_procedures()?)
        })?;

        // Derived-value passes
        self.run_phase(conn, "Updating magnetic declination", |_| {
            Ok(compiler.update_magvar()?)
        })?;
        self.run_phase(conn, "Updating VORTAC and TACAN channels", |_| {
            Ok(compiler.update_tacan_channel()?)
        })?;
        self.run_phase(conn, "Updating ILS geometry", |_| {
            Ok(compiler.update_ils_geometry()?)
        })?;
        if self.aborted {
            return Ok(());
        }

        if self.report("Writing procedures") {
            return Ok(());
        }
        conn.execute_batch("begin")?;
        match compiler.write_procedures() {
            Ok(_) => conn.execute_batch("commit")?,
            Err(e) => {
                let _ = conn.execute_batch("rollback");
                return Err(e.into());
            }
        }

        // Second index pass covers the tables written since the first
        self.run_phase(conn, "Creating indexes", |conn| {
            Ok(schema::create_indexes_post_load(conn)?)
        })?;
        Ok(())
    }

    /// Binary scenery flow: iterate discovered areas in layer order.
    fn load_bgl(
        &mut self,
        conn: &Connection,
        magdec: &MagDecReader,
        base_path: &Path,
        scenery_config: &Path,
        result: &mut ResultFlags,
    ) -> Result<(), CompileError> {
        crate::scenery::check_base_path(base_path)?;
        let config = SceneryConfig::read(scenery_config)?;

        self.run_phase(conn, "Writing magnetic declination table", |conn| {
            Ok(magdec.write_to_table(conn)?)
        })?;

        let mut airport_index = AirportIndex::new();
        let mut writer = BglWriter::new(conn, magdec, &mut airport_index, self.options.strict);

        for area in config.active_areas() {
            if area.title.to_lowercase().contains("navigraph") {
                // Report back to the caller, the package overrides stock
                // navdata
                result.navigraph_found = true;
            }
            if self.report(&area.title) {
                return Ok(());
            }

            conn.execute_batch("begin")?;
            let area_result = (|| -> Result<(), CompileError> {
                conn.execute(
                    "insert into scenery_area (area_number, layer, title, local_path, active)
                     values (?1, ?2, ?3, ?4, 1)",
                    rusqlite::params![
                        area.area_number,
                        area.layer,
                        area.title,
                        area.local_path.display().to_string()
                    ],
                )?;
                let scenery_area_id = conn.last_insert_rowid();
                writer.write_scenery_area(base_path, area, scenery_area_id)?;
                Ok(())
            })();
            match area_result {
                Ok(()) => conn.execute_batch("commit")?,
                Err(e) => {
                    let _ = conn.execute_batch("rollback");
                    return Err(e);
                }
            }

            let file_errors = writer.take_errors();
            if !file_errors.is_empty() {
                self.errors.areas.push(SceneryAreaErrors {
                    scenery_area: area.title.clone(),
                    file_errors,
                });
            }
        }
        drop(writer);

        if self.post_load_indexes_and_dedup(conn)? {
            return Ok(());
        }
        self.resolve_airways(conn)?;
        Ok(())
    }

    /// Text-line source flow.
    fn load_textline(
        &mut self,
        conn: &Connection,
        magdec: &MagDecReader,
        base_path: &Path,
    ) -> Result<(), CompileError> {
        self.run_phase(conn, "Writing magnetic declination table", |conn| {
            Ok(magdec.write_to_table(conn)?)
        })?;

        if self.report("Compiling text source") {
            return Ok(());
        }
        conn.execute_batch("begin")?;
        let mut compiler = TextCompiler::new(conn, magdec);
        match compiler.compile(base_path) {
            Ok(()) => conn.execute_batch("commit")?,
            Err(e) => {
                let _ = conn.execute_batch("rollback");
                return Err(e.into());
            }
        }

        if self.post_load_indexes_and_dedup(conn)? {
            return Ok(());
        }
        self.resolve_airways(conn)?;
        Ok(())
    }

    /// Post-load index wave and the optional duplicate cleanup.
    ///
    /// Deduplication must run before any foreign-key ids are assigned by
    /// the later passes; this ordering is load-bearing.
    fn post_load_indexes_and_dedup(&mut self, conn: &Connection) -> Result<bool, CompileError> {
        self.run_phase(conn, "Creating indexes", |conn| {
            Ok(schema::create_indexes_post_load(conn)?)
        })?;
        self.run_phase(conn, "Creating boundary indexes", |conn| {
            Ok(schema::create_indexes_post_load_boundary(conn)?)
        })?;
        if self.options.deduplicate {
            self.run_phase(conn, "Clean up", |conn| Ok(scripts::delete_duplicates(conn)?))?;
        }
        Ok(self.aborted)
    }

    /// Connects staged airway points into airway segments.
    fn resolve_airways(&mut self, conn: &Connection) -> Result<(), CompileError> {
        if !self.options.resolve_airways || self.aborted {
            return Ok(());
        }
        if self.report("Creating airways") {
            return Ok(());
        }
        conn.execute_batch("begin")?;
        let mut resolver = AirwayResolver::new(conn);
        resolver.set_max_segment_length_nm(self.options.airway_max_length_nm());
        match resolver.run() {
            Ok(_) => conn.execute_batch("commit")?,
            Err(e) => {
                let _ = conn.execute_batch("rollback");
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Compares row counts against the declared minimums.
    fn basic_validation(&mut self, conn: &Connection) -> Result<bool, CompileError> {
        self.report("Basic validation");
        let mut ok = true;
        for (table, min_count) in &self.options.basic_validation_tables {
            if !db::has_table(conn, table)? {
                tracing::warn!(table, "Basic validation: table not found");
                ok = false;
                continue;
            }
            let count = db::row_count(conn, table)?;
            if count < *min_count {
                tracing::warn!(
                    table,
                    count,
                    min_count,
                    "Basic validation: row count below minimum"
                );
                ok = false;
            } else {
                tracing::info!(table, count, min_count, "Basic validation: table is OK");
            }
        }
        Ok(ok)
    }

    /// One progress step; latches the abort flag.
    fn report(&mut self, message: &str) -> bool {
        if self.aborted {
            return true;
        }
        if self.progress.report(message) {
            self.aborted = true;
        }
        self.aborted
    }

    /// Runs one phase inside its own transaction with a cancellation
    /// check up front.
    fn run_phase<F>(
        &mut self,
        conn: &Connection,
        message: &str,
        phase: F,
    ) -> Result<(), CompileError>
    where
        F: FnOnce(&Connection) -> Result<(), CompileError>,
    {
        if self.report(message) {
            return Ok(());
        }
        conn.execute_batch("begin")?;
        match phase(conn) {
            Ok(()) => {
                conn.execute_batch("commit")?;
                Ok(())
            }
            Err(e) => {
                let _ = conn.execute_batch("rollback");
                Err(e)
            }
        }
    }

    /// Rough step total for progress percentages.
    fn count_steps(&self) -> u64 {
        // Schema 8, load about 14, cross reference 7, search 1, final
        // indexes 2
        let mut total = 32u64;
        if self.options.deduplicate {
            total += 1;
        }
        if self.options.resolve_airways {
            total += 1;
        }
        if self.options.create_route_tables {
            total += 4;
        }
        if self.options.basic_validation {
            total += 1;
        }
        if self.options.vacuum {
            total += 1;
        }
        if self.options.analyze {
            total += 1;
        }
        total
    }
}
