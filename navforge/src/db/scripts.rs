//! Cross-reference, deduplication and finalization passes.
//!
//! These run after all adapters have loaded and operate purely inside the
//! store. Ordering matters:
//!
//! 1. [`delete_duplicates`] runs before any pass assigns foreign-key ids;
//!    later ids win because add-on areas load after base areas.
//! 2. The id-resolution scripts ([`update_waypoint_nav_ids`],
//!    [`update_navaid_airport_ids`], [`update_approaches`],
//!    [`update_ils_ids`]) require the post-load indexes.
//! 3. [`update_airport_regions`] orders candidates deterministically so
//!    re-runs produce identical rows regardless of navaid insertion order.

use rusqlite::Connection;

use crate::geo::{meter_to_nm, nm_to_meter, Pos};

/// Deletes duplicates across overlapping source areas.
///
/// Keeps the row with the highest id per identity key: areas load in
/// layer order, so the highest id comes from the highest-priority area.
/// Must run before foreign-key resolution; afterwards the surviving rows
/// are the only targets the resolution scripts can bind to.
pub fn delete_duplicates(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        delete from runway_end where runway_end_id in (
          select r.primary_end_id from runway r where r.airport_id in (
            select airport_id from airport where airport_id not in (
              select max(airport_id) from airport group by ident)));
        delete from runway_end where runway_end_id in (
          select r.secondary_end_id from runway r where r.airport_id in (
            select airport_id from airport where airport_id not in (
              select max(airport_id) from airport group by ident)));
        delete from runway where airport_id in (
          select airport_id from airport where airport_id not in (
            select max(airport_id) from airport group by ident));
        delete from com where airport_id in (
          select airport_id from airport where airport_id not in (
            select max(airport_id) from airport group by ident));
        delete from airport where airport_id not in (
          select max(airport_id) from airport group by ident);

        delete from waypoint where waypoint_id not in (
          select max(waypoint_id) from waypoint group by ident, region, type);
        delete from vor where vor_id not in (
          select max(vor_id) from vor group by ident, region);
        delete from ndb where ndb_id not in (
          select max(ndb_id) from ndb group by ident, region);
        delete from ils where ils_id not in (
          select max(ils_id) from ils group by ident, loc_airport_ident, loc_runway_name);
        ",
    )?;
    tracing::debug!("Deleted duplicate rows from overlapping source areas");
    Ok(())
}

/// Sets `waypoint.nav_id` from the VOR/NDB tables and refreshes the
/// per-waypoint airway counters.
pub fn update_waypoint_nav_ids(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        update waypoint set nav_id = (
          select v.vor_id from vor v
          where v.ident = waypoint.ident and v.region = waypoint.region)
        where type = 'V';

        update waypoint set nav_id = (
          select n.ndb_id from ndb n
          where n.ident = waypoint.ident and n.region = waypoint.region)
        where type = 'N';

        update waypoint set num_victor_airway = (
          select count(1) from airway aw
          where (aw.from_waypoint_id = waypoint.waypoint_id or
                 aw.to_waypoint_id = waypoint.waypoint_id)
            and aw.airway_type in ('V', 'B'));

        update waypoint set num_jet_airway = (
          select count(1) from airway aw
          where (aw.from_waypoint_id = waypoint.waypoint_id or
                 aw.to_waypoint_id = waypoint.waypoint_id)
            and aw.airway_type in ('J', 'B'));
        ",
    )
}

/// Sets `airport_id` on waypoints and navaids from their stored airport
/// idents.
pub fn update_navaid_airport_ids(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        update waypoint set airport_id = (
          select a.airport_id from airport a where a.ident = waypoint.airport_ident)
        where airport_ident is not null;

        update vor set airport_id = (
          select a.airport_id from airport a where a.ident = vor.airport_ident)
        where airport_ident is not null;

        update ndb set airport_id = (
          select a.airport_id from airport a where a.ident = ndb.airport_ident)
        where airport_ident is not null;
        ",
    )
}

/// Resolves approach airport and runway-end references and refreshes the
/// per-airport approach counter.
pub fn update_approaches(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        update approach set airport_id = (
          select a.airport_id from airport a where a.ident = approach.airport_ident)
        where airport_id is null;

        update approach set runway_end_id = (
          select e.runway_end_id from airport a
          join runway r on r.airport_id = a.airport_id
          join runway_end e on e.runway_end_id in (r.primary_end_id, r.secondary_end_id)
          where a.ident = approach.airport_ident and e.name = approach.runway_name)
        where runway_name is not null;

        update airport set num_approach = (
          select count(1) from approach ap where ap.airport_id = airport.airport_id);
        ",
    )
}

/// Assigns a region to airports lacking one from the nearest navaid.
///
/// The candidate ordering (squared degree distance, ident, id) makes the
/// result independent of navaid insertion order.
pub fn update_airport_regions(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        update airport set region = (
          select v.region from vor v where v.region is not null
          order by (v.lonx - airport.lonx) * (v.lonx - airport.lonx) +
                   (v.laty - airport.laty) * (v.laty - airport.laty),
                   v.ident, v.vor_id
          limit 1)
        where region is null;

        update airport set region = (
          select n.region from ndb n where n.region is not null
          order by (n.lonx - airport.lonx) * (n.lonx - airport.lonx) +
                   (n.laty - airport.laty) * (n.laty - airport.laty),
                   n.ident, n.ndb_id
          limit 1)
        where region is null;
        ",
    )
}

/// Resolves the ILS / runway-end linkage in both directions.
///
/// ILS rows get the integer runway-end id; runway ends missing an ILS
/// ident get it backfilled from the resolved ILS. Neither side owns the
/// other; both were loaded independently with string identifiers.
pub fn update_ils_ids(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        update ils set loc_runway_end_id = (
          select e.runway_end_id from airport a
          join runway r on r.airport_id = a.airport_id
          join runway_end e on e.runway_end_id in (r.primary_end_id, r.secondary_end_id)
          where a.ident = ils.loc_airport_ident and e.name = ils.loc_runway_name)
        where loc_airport_ident is not null and loc_runway_name is not null;

        update runway_end set ils_ident = (
          select i.ident from ils i where i.loc_runway_end_id = runway_end.runway_end_id)
        where ils_ident is null
          and exists (select 1 from ils i where i.loc_runway_end_id = runway_end.runway_end_id);
        ",
    )
}

/// Refreshes the ILS-equipped runway-end counter on airports.
pub fn update_num_ils(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        update airport set num_runway_end_ils = (
          select count(1) from runway r
          join runway_end e on e.runway_end_id in (r.primary_end_id, r.secondary_end_id)
          where r.airport_id = airport.airport_id and e.ils_ident is not null);
        ",
    )
}

/// Rebuilds the denormalized search table from waypoints and navaids.
pub fn populate_nav_search(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        delete from nav_search;

        insert into nav_search (vor_id, airport_id, airport_ident, ident, name, region, range,
                                type, nav_type, frequency, channel, mag_var, altitude, scheme,
                                lonx, laty)
        select vor_id, airport_id, airport_ident, ident, name, region, range,
               type, 'VOR', frequency, channel, mag_var, altitude, 'V', lonx, laty
        from vor;

        insert into nav_search (ndb_id, airport_id, airport_ident, ident, name, region, range,
                                type, nav_type, frequency, mag_var, altitude, scheme, lonx, laty)
        select ndb_id, airport_id, airport_ident, ident, name, region, range,
               type, 'NDB', frequency, mag_var, altitude, 'N', lonx, laty
        from ndb;

        insert into nav_search (waypoint_id, waypoint_nav_id, airport_id, airport_ident, ident,
                                region, type, nav_type, mag_var, scheme, lonx, laty)
        select waypoint_id, nav_id, airport_id, airport_ident, ident,
               region, type, 'WAYPOINT', mag_var, 'W', lonx, laty
        from waypoint;
        ",
    )
}

/// Removes unreferenced dummy waypoints added for airway generation.
///
/// Runs after the airway counters are up to date.
pub fn clean_waypoints(conn: &Connection) -> rusqlite::Result<()> {
    let deleted = conn.execute(
        "
        delete from waypoint where type = 'WU'
          and num_victor_airway = 0 and num_jet_airway = 0
          and not exists (select 1 from airway aw
                          where aw.from_waypoint_id = waypoint.waypoint_id
                             or aw.to_waypoint_id = waypoint.waypoint_id)
          and not exists (select 1 from approach_leg l
                          where l.fix_ident = waypoint.ident and l.fix_region = waypoint.region)
          and not exists (select 1 from transition_leg l
                          where l.fix_ident = waypoint.ident and l.fix_region = waypoint.region)
        ",
        [],
    )?;
    tracing::debug!(deleted, "Cleaned up dummy waypoints");
    Ok(())
}

/// Populates the route-node tables from navaids and airway waypoints.
pub fn populate_route_nodes(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        delete from route_node_radio;
        insert into route_node_radio (nav_id, type, range, lonx, laty)
        select vor_id, case when dme_only = 1 then 2 else 1 end, range, lonx, laty from vor;
        insert into route_node_radio (nav_id, type, range, lonx, laty)
        select ndb_id, 3, range, lonx, laty from ndb;

        delete from route_node_airway;
        insert into route_node_airway (nav_id, type, lonx, laty)
        select waypoint_id,
               case when num_victor_airway > 0 and num_jet_airway > 0 then 6
                    when num_jet_airway > 0 then 5
                    else 4 end,
               lonx, laty
        from waypoint
        where num_victor_airway > 0 or num_jet_airway > 0;
        ",
    )
}

/// Populates the airway route edges from resolved airway segments.
pub fn populate_route_edges_airway(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        delete from route_edge_airway;
        insert into route_edge_airway (airway_id, from_node_id, to_node_id,
                                       minimum_altitude, maximum_altitude, airway_type, direction)
        select aw.airway_id, nf.node_id, nt.node_id,
               aw.minimum_altitude, aw.maximum_altitude, aw.airway_type, aw.direction
        from airway aw
        join route_node_airway nf on nf.nav_id = aw.from_waypoint_id
        join route_node_airway nt on nt.nav_id = aw.to_waypoint_id;
        ",
    )
}

/// Maximum radio-navaid edge length.
const RADIO_EDGE_RANGE_NM: f64 = 200.0;

/// Edges kept per radio node.
const RADIO_EDGE_NEIGHBOURS: usize = 5;

/// Connects VOR and NDB route nodes into a radio navigation network.
///
/// Each node gets edges to its nearest neighbours within
/// [`RADIO_EDGE_RANGE_NM`]. Node order and the (distance, id) neighbour
/// ordering keep the output deterministic.
pub fn write_route_edges_radio(conn: &Connection) -> rusqlite::Result<usize> {
    struct Node {
        id: i64,
        node_type: i64,
        pos: Pos,
    }

    let mut stmt =
        conn.prepare("select node_id, type, lonx, laty from route_node_radio order by node_id")?;
    let nodes: Vec<Node> = stmt
        .query_map([], |row| {
            Ok(Node {
                id: row.get(0)?,
                node_type: row.get(1)?,
                pos: Pos::new(row.get(2)?, row.get(3)?),
            })
        })?
        .collect::<Result<_, _>>()?;
    drop(stmt);

    conn.execute("delete from route_edge_radio", [])?;
    let mut insert = conn.prepare(
        "insert into route_edge_radio (from_node_id, from_node_type, to_node_id, to_node_type, distance)
         values (?1, ?2, ?3, ?4, ?5)",
    )?;

    let max_meter = nm_to_meter(RADIO_EDGE_RANGE_NM);
    let mut edges = 0usize;
    for node in &nodes {
        let mut neighbours: Vec<(&Node, f64)> = nodes
            .iter()
            .filter(|other| other.id != node.id)
            .map(|other| (other, node.pos.distance_meter_to(&other.pos)))
            .filter(|(_, dist)| *dist <= max_meter)
            .collect();
        neighbours.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.id.cmp(&b.0.id)));

        for (other, dist) in neighbours.into_iter().take(RADIO_EDGE_NEIGHBOURS) {
            insert.execute(rusqlite::params![
                node.id,
                node.node_type,
                other.id,
                other.node_type,
                meter_to_nm(dist).round() as i64
            ])?;
            edges += 1;
        }
    }
    tracing::debug!(edges, nodes = nodes.len(), "Created radio route edges");
    Ok(edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_delete_duplicates_keeps_latest_airport() {
        let conn = test_conn();
        conn.execute_batch(
            "
            insert into airport (airport_id, ident, left_lonx, top_laty, right_lonx, bottom_laty, lonx, laty)
              values (1, 'EDDF', 0,0,0,0, 8.5, 50.0),
                     (2, 'EDDF', 0,0,0,0, 8.6, 50.1),
                     (3, 'KJFK', 0,0,0,0, -73.7, 40.6);
            insert into runway_end (runway_end_id, name, end_type, heading, lonx, laty)
              values (10, '07', 'P', 70, 8.5, 50.0), (11, '25', 'S', 250, 8.5, 50.0);
            insert into runway (runway_id, airport_id, primary_end_id, secondary_end_id, length, width,
                                heading, primary_lonx, primary_laty, secondary_lonx, secondary_laty, lonx, laty)
              values (1, 1, 10, 11, 9000, 150, 70, 0,0, 0,0, 8.5, 50.0);
            ",
        )
        .unwrap();

        delete_duplicates(&conn).unwrap();

        // The older EDDF (id 1) and its runway structure are gone
        let count: i64 = conn
            .query_row("select count(1) from airport where ident = 'EDDF'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let id: i64 = conn
            .query_row("select airport_id from airport where ident = 'EDDF'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(id, 2);
        assert_eq!(crate::db::row_count(&conn, "runway").unwrap(), 0);
        assert_eq!(crate::db::row_count(&conn, "runway_end").unwrap(), 0);
        assert_eq!(crate::db::row_count(&conn, "airport").unwrap(), 2);
    }

    #[test]
    fn test_update_airport_regions_is_deterministic() {
        let conn = test_conn();
        conn.execute_batch(
            "
            insert into airport (airport_id, ident, left_lonx, top_laty, right_lonx, bottom_laty, lonx, laty)
              values (1, 'XXXX', 0,0,0,0, 10.0, 50.0);
            -- Two VORs at the same distance; tie broken by ident then id
            insert into vor (vor_id, ident, region, type, lonx, laty)
              values (1, 'BBB', 'ED', 'H', 11.0, 50.0),
                     (2, 'AAA', 'LF', 'H', 9.0, 50.0);
            ",
        )
        .unwrap();

        update_airport_regions(&conn).unwrap();
        let region: String = conn
            .query_row("select region from airport where airport_id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(region, "LF");
    }

    #[test]
    fn test_update_ils_ids_links_both_sides() {
        let conn = test_conn();
        conn.execute_batch(
            "
            insert into airport (airport_id, ident, left_lonx, top_laty, right_lonx, bottom_laty, lonx, laty)
              values (1, 'EDDF', 0,0,0,0, 8.5, 50.0);
            insert into runway_end (runway_end_id, name, end_type, heading, lonx, laty)
              values (10, '07C', 'P', 70, 8.5, 50.0), (11, '25C', 'S', 250, 8.6, 50.0);
            insert into runway (runway_id, airport_id, primary_end_id, secondary_end_id, length, width,
                                heading, primary_lonx, primary_laty, secondary_lonx, secondary_laty, lonx, laty)
              values (1, 1, 10, 11, 13000, 200, 70, 0,0, 0,0, 8.55, 50.0);
            insert into ils (ils_id, ident, frequency, loc_airport_ident, loc_runway_name,
                             loc_heading, lonx, laty)
              values (1, 'IFEM', 110300, 'EDDF', '07C', 70.0, 8.5, 50.0);
            ",
        )
        .unwrap();

        update_ils_ids(&conn).unwrap();

        let end_id: i64 = conn
            .query_row("select loc_runway_end_id from ils where ils_id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(end_id, 10);
        let ils_ident: String = conn
            .query_row("select ils_ident from runway_end where runway_end_id = 10", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(ils_ident, "IFEM");

        update_num_ils(&conn).unwrap();
        let num: i64 = conn
            .query_row("select num_runway_end_ils from airport where airport_id = 1", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(num, 1);
    }

    #[test]
    fn test_route_edges_radio() {
        let conn = test_conn();
        conn.execute_batch(
            "
            insert into vor (vor_id, ident, region, type, frequency, range, lonx, laty)
              values (1, 'AAA', 'ED', 'H', 11350, 130, 8.0, 50.0),
                     (2, 'BBB', 'ED', 'H', 11400, 130, 8.5, 50.2),
                     (3, 'CCC', 'ED', 'H', 11450, 130, 100.0, -20.0);
            ",
        )
        .unwrap();

        populate_route_nodes(&conn).unwrap();
        let edges = write_route_edges_radio(&conn).unwrap();
        // The two close stations link to each other; the remote one links
        // to nothing within range.
        assert_eq!(edges, 2);
    }
}
