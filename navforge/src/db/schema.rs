//! Output schema DDL.
//!
//! Schema objects exist for the lifetime of one compilation run: a fresh
//! run drops and recreates them. Creation is split into the same groups
//! the orchestrator reports on (boundary, nav, airport, route, meta,
//! views) and each group is executed inside its own transaction by the
//! caller.
//!
//! Indexes come in two waves: [`create_indexes_post_load`] (A) right
//! after the adapters finish, so the cross-reference passes have the
//! ident lookups they join on, and the final search/route indexes (B) in
//! [`create_indexes_airport`] / [`create_indexes_search`] /
//! [`create_indexes_route`].

use rusqlite::Connection;

const DROP_VIEWS: &str = "
drop view if exists airport_overview;
drop view if exists ils_runway_view;
";

const DROP_ROUTING_SEARCH: &str = "
drop table if exists nav_search;
drop table if exists route_node_radio;
drop table if exists route_edge_radio;
drop table if exists route_node_airway;
drop table if exists route_edge_airway;
";

const DROP_NAV: &str = "
drop table if exists waypoint;
drop table if exists vor;
drop table if exists ndb;
drop table if exists marker;
drop table if exists ils;
drop table if exists airway;
drop table if exists tmp_airway_point;
drop table if exists boundary;
";

const DROP_AIRPORT_FACILITIES: &str = "
drop table if exists runway;
drop table if exists runway_end;
drop table if exists com;
";

const DROP_APPROACH: &str = "
drop table if exists approach_leg;
drop table if exists transition_leg;
drop table if exists transition;
drop table if exists approach;
";

const DROP_AIRPORT: &str = "
drop table if exists airport;
";

const DROP_META: &str = "
drop table if exists metadata;
drop table if exists magdecl;
drop table if exists source_file;
drop table if exists scenery_area;
";

const CREATE_BOUNDARY_SCHEMA: &str = "
create table boundary (
  boundary_id integer primary key,
  source_file_id integer,
  type varchar(15),
  name varchar(250),
  com_type varchar(30),
  com_frequency integer,
  com_name varchar(50),
  min_altitude_type varchar(15),
  max_altitude_type varchar(15),
  min_altitude integer,
  max_altitude integer,
  geometry blob,
  left_lonx double not null,
  top_laty double not null,
  right_lonx double not null,
  bottom_laty double not null
);
";

const CREATE_NAV_SCHEMA: &str = "
create table waypoint (
  waypoint_id integer primary key,
  source_file_id integer,
  nav_id integer,
  ident varchar(5) not null,
  region varchar(2),
  airport_id integer,
  airport_ident varchar(4),
  type varchar(15) not null,
  arinc_type varchar(4),
  num_victor_airway integer not null default 0,
  num_jet_airway integer not null default 0,
  mag_var double not null default 0,
  lonx double not null,
  laty double not null
);

create table vor (
  vor_id integer primary key,
  source_file_id integer,
  ident varchar(5) not null,
  name varchar(50),
  region varchar(2),
  airport_id integer,
  airport_ident varchar(4),
  type varchar(15) not null,
  frequency integer,
  channel varchar(5),
  range integer,
  mag_var double not null default 0,
  dme_only integer not null default 0,
  dme_altitude integer,
  dme_lonx double,
  dme_laty double,
  altitude integer,
  lonx double not null,
  laty double not null
);

create table ndb (
  ndb_id integer primary key,
  source_file_id integer,
  ident varchar(5) not null,
  name varchar(50),
  region varchar(2),
  airport_id integer,
  airport_ident varchar(4),
  type varchar(15),
  frequency integer,
  range integer,
  mag_var double not null default 0,
  altitude integer,
  lonx double not null,
  laty double not null
);

create table marker (
  marker_id integer primary key,
  source_file_id integer,
  type varchar(15),
  ident varchar(5),
  region varchar(2),
  heading double,
  altitude integer,
  lonx double not null,
  laty double not null
);

create table ils (
  ils_id integer primary key,
  ident varchar(5) not null,
  name varchar(50),
  region varchar(2),
  frequency integer not null,
  range integer,
  mag_var double not null default 0,
  has_backcourse integer not null default 0,
  dme_range integer,
  dme_altitude integer,
  dme_lonx double,
  dme_laty double,
  gs_range integer,
  gs_pitch double,
  gs_altitude integer,
  gs_lonx double,
  gs_laty double,
  loc_runway_end_id integer,
  loc_airport_ident varchar(4),
  loc_runway_name varchar(10),
  loc_heading double not null,
  loc_width double,
  end1_lonx double,
  end1_laty double,
  end_mid_lonx double,
  end_mid_laty double,
  end2_lonx double,
  end2_laty double,
  altitude integer,
  lonx double not null,
  laty double not null
);

create table airway (
  airway_id integer primary key,
  airway_name varchar(5) not null,
  airway_type varchar(15) not null,
  airway_fragment_no integer not null,
  sequence_no integer not null,
  from_waypoint_id integer not null,
  to_waypoint_id integer not null,
  direction varchar(1),
  minimum_altitude integer,
  maximum_altitude integer,
  left_lonx double not null,
  top_laty double not null,
  right_lonx double not null,
  bottom_laty double not null,
  from_lonx double not null,
  from_laty double not null,
  to_lonx double not null,
  to_laty double not null
);

create table tmp_airway_point (
  tmp_airway_point_id integer primary key,
  name varchar(5) not null,
  type varchar(1),
  direction varchar(1),
  seqno integer not null,
  waypoint_description_code varchar(2),
  waypoint_ident varchar(5) not null,
  waypoint_region varchar(2),
  minimum_altitude integer,
  maximum_altitude integer,
  lonx double not null,
  laty double not null
);
";

const CREATE_AIRPORT_SCHEMA: &str = "
create table airport (
  airport_id integer primary key,
  source_file_id integer,
  ident varchar(10) not null,
  name varchar(50),
  city varchar(50),
  state varchar(50),
  country varchar(50),
  region varchar(4),
  fuel_flags integer not null default 0,
  has_avgas integer not null default 0,
  has_jetfuel integer not null default 0,
  has_tower_object integer not null default 0,
  is_closed integer not null default 0,
  is_military integer not null default 0,
  is_addon integer not null default 0,
  rating integer not null default 0,
  num_com integer not null default 0,
  num_approach integer not null default 0,
  num_runway_hard integer not null default 0,
  num_runway_soft integer not null default 0,
  num_runway_water integer not null default 0,
  num_runway_end_closed integer not null default 0,
  num_runway_end_ils integer not null default 0,
  num_runways integer not null default 0,
  num_helipad integer not null default 0,
  longest_runway_length integer not null default 0,
  longest_runway_width integer not null default 0,
  longest_runway_heading double not null default 0,
  longest_runway_surface varchar(15),
  transition_altitude integer,
  left_lonx double not null,
  top_laty double not null,
  right_lonx double not null,
  bottom_laty double not null,
  mag_var double not null default 0,
  altitude integer not null default 0,
  lonx double not null,
  laty double not null
);

create table runway (
  runway_id integer primary key,
  airport_id integer not null,
  primary_end_id integer not null,
  secondary_end_id integer not null,
  surface varchar(15),
  length integer not null,
  width integer not null,
  heading double not null,
  pattern_altitude integer not null default 0,
  marking_flags integer not null default 0,
  altitude integer not null default 0,
  primary_lonx double not null,
  primary_laty double not null,
  secondary_lonx double not null,
  secondary_laty double not null,
  lonx double not null,
  laty double not null
);

create table runway_end (
  runway_end_id integer primary key,
  name varchar(10) not null,
  end_type varchar(1) not null,
  offset_threshold integer not null default 0,
  has_closed_markings integer not null default 0,
  is_takeoff integer not null default 1,
  is_landing integer not null default 1,
  ils_ident varchar(5),
  heading double not null,
  lonx double not null,
  laty double not null
);

create table com (
  com_id integer primary key,
  airport_id integer not null,
  type varchar(30),
  frequency integer not null,
  name varchar(50)
);

create table approach (
  approach_id integer primary key,
  airport_id integer,
  airport_ident varchar(10),
  runway_end_id integer,
  runway_name varchar(10),
  type varchar(25),
  arinc_type varchar(4),
  suffix varchar(1),
  has_gps_overlay integer not null default 0,
  fix_type varchar(25),
  fix_ident varchar(5),
  fix_region varchar(2),
  altitude integer,
  heading double,
  missed_altitude integer
);

create table transition (
  transition_id integer primary key,
  approach_id integer not null,
  type varchar(25),
  fix_type varchar(25),
  fix_ident varchar(5),
  fix_region varchar(2),
  altitude integer,
  dme_ident varchar(5),
  dme_radial double,
  dme_distance integer
);

create table approach_leg (
  approach_leg_id integer primary key,
  approach_id integer not null,
  is_missed integer not null default 0,
  type varchar(10),
  arinc_descr_code varchar(25),
  alt_descriptor varchar(10),
  turn_direction varchar(10),
  fix_type varchar(25),
  fix_ident varchar(5),
  fix_region varchar(2),
  recommended_fix_type varchar(25),
  recommended_fix_ident varchar(5),
  recommended_fix_region varchar(2),
  is_flyover integer not null default 0,
  is_true_course integer not null default 0,
  course double,
  distance double,
  time double,
  theta double,
  rho double,
  altitude1 double,
  altitude2 double,
  speed_limit_type varchar(2),
  speed_limit integer,
  fix_lonx double,
  fix_laty double,
  recommended_fix_lonx double,
  recommended_fix_laty double
);

create table transition_leg (
  transition_leg_id integer primary key,
  transition_id integer not null,
  is_missed integer not null default 0,
  type varchar(10),
  arinc_descr_code varchar(25),
  alt_descriptor varchar(10),
  turn_direction varchar(10),
  fix_type varchar(25),
  fix_ident varchar(5),
  fix_region varchar(2),
  recommended_fix_type varchar(25),
  recommended_fix_ident varchar(5),
  recommended_fix_region varchar(2),
  is_flyover integer not null default 0,
  is_true_course integer not null default 0,
  course double,
  distance double,
  time double,
  theta double,
  rho double,
  altitude1 double,
  altitude2 double,
  speed_limit_type varchar(2),
  speed_limit integer,
  fix_lonx double,
  fix_laty double,
  recommended_fix_lonx double,
  recommended_fix_laty double
);
";

const CREATE_ROUTE_SCHEMA: &str = "
create table route_node_radio (
  node_id integer primary key,
  nav_id integer not null,
  type integer not null,
  range integer,
  lonx double not null,
  laty double not null
);

create table route_edge_radio (
  edge_id integer primary key,
  from_node_id integer not null,
  from_node_type integer not null,
  to_node_id integer not null,
  to_node_type integer not null,
  distance integer
);

create table route_node_airway (
  node_id integer primary key,
  nav_id integer not null,
  type integer not null,
  lonx double not null,
  laty double not null
);

create table route_edge_airway (
  edge_id integer primary key,
  airway_id integer not null,
  from_node_id integer not null,
  to_node_id integer not null,
  minimum_altitude integer,
  maximum_altitude integer,
  airway_type varchar(15),
  direction varchar(1)
);

create table nav_search (
  nav_search_id integer primary key,
  waypoint_id integer,
  waypoint_nav_id integer,
  vor_id integer,
  ndb_id integer,
  airport_id integer,
  airport_ident varchar(4),
  ident varchar(5),
  name varchar(50),
  region varchar(2),
  range integer,
  type varchar(15),
  nav_type varchar(15),
  frequency integer,
  channel varchar(5),
  mag_var double,
  altitude integer,
  scheme varchar(5),
  lonx double not null,
  laty double not null
);
";

const CREATE_META_SCHEMA: &str = "
create table metadata (
  db_version_major integer not null,
  db_version_minor integer not null,
  compiler_version varchar(250),
  data_source varchar(10),
  airac_cycle varchar(10),
  valid_through varchar(30),
  last_load_timestamp varchar(100)
);

create table magdecl (
  magdecl_id integer primary key,
  num_cols integer not null,
  num_rows integer not null,
  grid blob
);

create table scenery_area (
  scenery_area_id integer primary key,
  area_number integer not null,
  layer integer not null default 0,
  title varchar(250),
  local_path varchar(250),
  active integer not null default 1
);

create table source_file (
  source_file_id integer primary key,
  scenery_area_id integer not null,
  file_path varchar(1000),
  filename varchar(250),
  size integer,
  record_count integer not null default 0
);
";

const CREATE_VIEWS: &str = "
create view airport_overview as
select airport_id, ident, name, country, region, num_runways, num_approach,
       num_runway_end_ils, longest_runway_length, rating, is_military, is_closed,
       mag_var, altitude, lonx, laty
from airport;

create view ils_runway_view as
select i.ils_id, i.ident, i.frequency, i.loc_heading, i.loc_airport_ident,
       i.loc_runway_name, i.loc_runway_end_id, e.name as runway_end_name,
       e.heading as runway_end_heading
from ils i left outer join runway_end e on i.loc_runway_end_id = e.runway_end_id;
";

/// Post-load index wave A: the ident lookups the cross-reference
/// passes join on.
const CREATE_INDEXES_POST_LOAD: &str = "
create index if not exists idx_airport_ident on airport(ident);
create index if not exists idx_waypoint_ident on waypoint(ident);
create index if not exists idx_waypoint_region on waypoint(region);
create index if not exists idx_waypoint_airport_ident on waypoint(airport_ident);
create index if not exists idx_vor_ident on vor(ident);
create index if not exists idx_vor_region on vor(region);
create index if not exists idx_ndb_ident on ndb(ident);
create index if not exists idx_ndb_region on ndb(region);
create index if not exists idx_ils_ident on ils(ident);
create index if not exists idx_ils_loc_airport_ident on ils(loc_airport_ident);
create index if not exists idx_runway_airport_id on runway(airport_id);
create index if not exists idx_approach_airport_ident on approach(airport_ident);
create index if not exists idx_tmp_airway_point_name on tmp_airway_point(name, seqno);
";

const CREATE_INDEXES_POST_LOAD_BOUNDARY: &str = "
create index if not exists idx_boundary_type on boundary(type);
create index if not exists idx_boundary_rect on boundary(left_lonx, top_laty, right_lonx, bottom_laty);
";

/// Final index wave B, airport part.
const CREATE_INDEXES_AIRPORT: &str = "
create index if not exists idx_airport_name on airport(name);
create index if not exists idx_airport_country on airport(country);
create index if not exists idx_airport_rect on airport(left_lonx, top_laty, right_lonx, bottom_laty);
create index if not exists idx_airport_longest on airport(longest_runway_length);
create index if not exists idx_runway_end_name on runway_end(name);
create index if not exists idx_approach_runway_end_id on approach(runway_end_id);
create index if not exists idx_approach_leg_approach_id on approach_leg(approach_id);
create index if not exists idx_transition_approach_id on transition(approach_id);
create index if not exists idx_transition_leg_transition_id on transition_leg(transition_id);
";

/// Final index wave B, search part.
const CREATE_INDEXES_SEARCH: &str = "
create index if not exists idx_nav_search_ident on nav_search(ident);
create index if not exists idx_nav_search_name on nav_search(name);
create index if not exists idx_nav_search_type on nav_search(type);
create index if not exists idx_nav_search_pos on nav_search(lonx, laty);
create index if not exists idx_airway_name on airway(airway_name);
create index if not exists idx_airway_from on airway(from_waypoint_id);
create index if not exists idx_airway_to on airway(to_waypoint_id);
";

/// Final index wave B, route part.
const CREATE_INDEXES_ROUTE: &str = "
create index if not exists idx_route_edge_radio_from on route_edge_radio(from_node_id);
create index if not exists idx_route_edge_radio_to on route_edge_radio(to_node_id);
create index if not exists idx_route_edge_airway_from on route_edge_airway(from_node_id);
create index if not exists idx_route_edge_airway_to on route_edge_airway(to_node_id);
";

pub fn drop_views(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(DROP_VIEWS)
}

pub fn drop_routing_and_search(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(DROP_ROUTING_SEARCH)
}

pub fn drop_nav(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(DROP_NAV)
}

pub fn drop_airport_facilities(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(DROP_AIRPORT_FACILITIES)
}

pub fn drop_approach(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(DROP_APPROACH)
}

pub fn drop_airport(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(DROP_AIRPORT)
}

pub fn drop_meta(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(DROP_META)
}

/// Creates all schema groups in dependency order.
pub fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(CREATE_BOUNDARY_SCHEMA)?;
    conn.execute_batch(CREATE_NAV_SCHEMA)?;
    conn.execute_batch(CREATE_AIRPORT_SCHEMA)?;
    conn.execute_batch(CREATE_ROUTE_SCHEMA)?;
    conn.execute_batch(CREATE_META_SCHEMA)?;
    conn.execute_batch(CREATE_VIEWS)?;
    Ok(())
}

pub fn create_indexes_post_load(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(CREATE_INDEXES_POST_LOAD)
}

pub fn create_indexes_post_load_boundary(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(CREATE_INDEXES_POST_LOAD_BOUNDARY)
}

pub fn create_indexes_airport(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(CREATE_INDEXES_AIRPORT)
}

pub fn create_indexes_search(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(CREATE_INDEXES_SEARCH)
}

pub fn create_indexes_route(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(CREATE_INDEXES_ROUTE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_creates_and_drops_cleanly() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();

        for table in ["airport", "runway", "runway_end", "waypoint", "vor", "ndb", "ils",
                      "airway", "approach", "approach_leg", "boundary", "metadata"] {
            assert!(crate::db::has_table(&conn, table).unwrap(), "missing table {table}");
        }

        drop_views(&conn).unwrap();
        drop_routing_and_search(&conn).unwrap();
        drop_nav(&conn).unwrap();
        drop_airport_facilities(&conn).unwrap();
        drop_approach(&conn).unwrap();
        drop_airport(&conn).unwrap();
        drop_meta(&conn).unwrap();

        assert!(!crate::db::has_table(&conn, "airport").unwrap());

        // A fresh run recreates everything
        create_schema(&conn).unwrap();
        assert!(crate::db::has_table(&conn, "airport").unwrap());
    }

    #[test]
    fn test_indexes_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        create_indexes_post_load(&conn).unwrap();
        create_indexes_post_load(&conn).unwrap();
        create_indexes_airport(&conn).unwrap();
        create_indexes_search(&conn).unwrap();
        create_indexes_route(&conn).unwrap();
    }
}
