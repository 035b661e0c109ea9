//! The truck schedule file (§6): the only artefact that flows between
//! refinement iterations. One solver run writes it; the next reads it back
//! both as a warm start for `x` and as the *allowed-truck* restriction set.

use crate::model::{self, Extracted, TruckRestriction};
use crate::network::Network;
use serde::Serialize;
use std::collections::HashMap;
use std::io::{BufRead, Write};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TruckRecord {
    pub source: usize,
    pub target: usize,
    pub time: f64,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FlowRecord {
    pub source: usize,
    pub target: usize,
    pub commodity_target: usize,
    pub shift: i32,
    pub time: f64,
    pub trolleys: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InventoryRecord {
    pub location: usize,
    pub time: f64,
    pub commodity_target: usize,
    pub shift: i32,
    pub value: f64,
}

/// One solved model's worth of output, keyed by wall-clock time rather than
/// tick so the file remains meaningful across a refinement run's changing
/// `Δt` (§5: "the only invariant is that the previous iteration's truck file
/// exists on disk when the next iteration starts").
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TruckSchedule {
    pub objective: f64,
    pub distance: f64,
    pub penalty: f64,
    pub unproduced: i64,
    pub undelivered: i64,
    pub trucks: Vec<TruckRecord>,
    pub flows: Vec<FlowRecord>,
    pub inventory: Vec<InventoryRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleError {
    MissingHeaderField(&'static str),
    Parse(String),
    Io(String),
}

impl std::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleError::MissingHeaderField(name) => write!(f, "truck schedule missing header field: {}", name),
            ScheduleError::Parse(msg) => write!(f, "parse error: {}", msg),
            ScheduleError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for ScheduleError {}

impl TruckSchedule {
    /// Build the on-disk record set from an extracted solution. Tick indices
    /// are converted to wall-clock time immediately, since `network`'s
    /// discretisation is specific to the run that produced `extracted`.
    pub fn from_extracted(network: &Network, extracted: &Extracted) -> Self {
        let trucks = extracted
            .trucks
            .iter()
            .map(|&(i, j, t, count)| TruckRecord { source: i, target: j, time: network.tick_time(t), count })
            .collect();
        let flows = extracted
            .flows
            .iter()
            .map(|&(i, j, t, target, shift, trolleys)| FlowRecord {
                source: i,
                target: j,
                commodity_target: target,
                shift,
                time: network.tick_time(t),
                trolleys,
            })
            .collect();
        let inventory = extracted
            .inventory
            .iter()
            .map(|&(i, t, target, shift, value)| InventoryRecord { location: i, time: network.tick_time(t), commodity_target: target, shift, value })
            .collect();
        TruckSchedule {
            objective: extracted.objective(),
            distance: extracted.distance,
            penalty: extracted.penalty,
            unproduced: extracted.unproduced,
            undelivered: extracted.undelivered,
            trucks,
            flows,
            inventory,
        }
    }

    /// The *allowed-truck* restriction set for a subsequent, finer-`Δt`
    /// model: every `(source, target)` used here, allowed within
    /// `deviation` hours of the wall-clock time it was used at.
    pub fn to_restriction(&self, deviation: f64) -> TruckRestriction {
        let mut restriction = TruckRestriction::new(deviation);
        for record in &self.trucks {
            restriction.insert(record.source, record.target, record.time);
        }
        restriction
    }

    /// `x[i,j,t].Start = count` for the next model's tick grid, converting
    /// each record's wall-clock time to that grid's tick via the release
    /// convention (never before the recorded dispatch time).
    pub fn to_warm_start(&self, network: &Network) -> HashMap<(usize, usize, i64), i64> {
        let mut starts: HashMap<(usize, usize, i64), i64> = HashMap::new();
        for record in &self.trucks {
            let tick = network.release_tick(record.time);
            *starts.entry((record.source, record.target, tick)).or_insert(0) += record.count;
        }
        starts
    }

    /// Render the schedule as pretty-printed JSON, for operators who want a
    /// structured summary alongside the line-oriented format §6 defines as
    /// the actual inter-iteration artefact.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the `OBJ/DIST/PEN/NPRO/NDEL` header followed by `I`/`T`/`S`/`C`
    /// record lines, in that order (§6).
    pub fn write<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        writeln!(w, "OBJ {}", self.objective)?;
        writeln!(w, "DIST {}", self.distance)?;
        writeln!(w, "PEN {}", self.penalty)?;
        writeln!(w, "NPRO {}", self.unproduced)?;
        writeln!(w, "NDEL {}", self.undelivered)?;
        writeln!(w)?;
        for record in &self.inventory {
            writeln!(w, "I {} {} {} {} {}", record.location, record.time, record.commodity_target, record.shift, record.value)?;
        }
        for record in &self.trucks {
            writeln!(w, "T {} {} {}", record.source, record.target, record.time)?;
        }
        for record in &self.flows {
            writeln!(w, "S {} {} {} {} {} {}", record.source, record.target, record.commodity_target, record.shift, record.time, record.trolleys)?;
        }
        for record in &self.trucks {
            writeln!(w, "C {} {} {} {}", record.source, record.target, record.time, record.count)?;
        }
        Ok(())
    }

    /// Read a schedule written by [`TruckSchedule::write`]. Truck counts are
    /// taken from `C` lines (the only record that carries a count); plain
    /// `T` lines are informational and are not re-parsed into `trucks` to
    /// avoid double-counting the same dispatch.
    pub fn read<R: BufRead>(r: R) -> Result<Self, ScheduleError> {
        let mut objective = None;
        let mut distance = None;
        let mut penalty = None;
        let mut unproduced = None;
        let mut undelivered = None;
        let mut trucks = Vec::new();
        let mut flows = Vec::new();
        let mut inventory = Vec::new();

        for line in r.lines() {
            let line = line.map_err(|e| ScheduleError::Io(e.to_string()))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let tag = parts.next().unwrap_or("");
            let rest: Vec<&str> = parts.collect();
            match tag {
                "OBJ" => objective = Some(parse_field::<f64>(&rest, 0, "objective")?),
                "DIST" => distance = Some(parse_field::<f64>(&rest, 0, "distance")?),
                "PEN" => penalty = Some(parse_field::<f64>(&rest, 0, "penalty")?),
                "NPRO" => unproduced = Some(parse_field::<i64>(&rest, 0, "unproduced count")?),
                "NDEL" => undelivered = Some(parse_field::<i64>(&rest, 0, "undelivered count")?),
                "I" => inventory.push(InventoryRecord {
                    location: parse_field(&rest, 0, "inventory location")?,
                    time: parse_field(&rest, 1, "inventory time")?,
                    commodity_target: parse_field(&rest, 2, "inventory commodity target")?,
                    shift: parse_field(&rest, 3, "inventory shift")?,
                    value: parse_field(&rest, 4, "inventory value")?,
                }),
                "T" => {
                    // Informational only; counts come from the matching `C` line.
                }
                "S" => flows.push(FlowRecord {
                    source: parse_field(&rest, 0, "flow source")?,
                    target: parse_field(&rest, 1, "flow target")?,
                    commodity_target: parse_field(&rest, 2, "flow commodity target")?,
                    shift: parse_field(&rest, 3, "flow shift")?,
                    time: parse_field(&rest, 4, "flow time")?,
                    trolleys: parse_field(&rest, 5, "flow trolleys")?,
                }),
                "C" => trucks.push(TruckRecord {
                    source: parse_field(&rest, 0, "truck source")?,
                    target: parse_field(&rest, 1, "truck target")?,
                    time: parse_field(&rest, 2, "truck time")?,
                    count: parse_field(&rest, 3, "truck count")?,
                }),
                other => {
                    log::warn!("skipping unknown truck schedule record tag: {}", other);
                }
            }
        }

        Ok(TruckSchedule {
            objective: objective.ok_or(ScheduleError::MissingHeaderField("OBJ"))?,
            distance: distance.ok_or(ScheduleError::MissingHeaderField("DIST"))?,
            penalty: penalty.ok_or(ScheduleError::MissingHeaderField("PEN"))?,
            unproduced: unproduced.ok_or(ScheduleError::MissingHeaderField("NPRO"))?,
            undelivered: undelivered.ok_or(ScheduleError::MissingHeaderField("NDEL"))?,
            trucks,
            flows,
            inventory,
        })
    }
}

fn parse_field<T: std::str::FromStr>(fields: &[&str], index: usize, what: &str) -> Result<T, ScheduleError> {
    fields
        .get(index)
        .ok_or_else(|| ScheduleError::Parse(format!("missing {}", what)))?
        .parse()
        .map_err(|_| ScheduleError::Parse(format!("invalid {}", what)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Extracted;
    use crate::network::Location;

    fn unit_network() -> Network {
        let mut network = Network::new();
        network.add_location(Location { name: "A".into(), x: 0.0, y: 0.0, source_capacity: 10, target_capacity: 10, cross_capacity: 0, num_docks: 1 });
        network.add_location(Location { name: "B".into(), x: 1.0, y: 0.0, source_capacity: 10, target_capacity: 10, cross_capacity: 0, num_docks: 1 });
        network.add_arc(0, 1, 1.0).unwrap();
        network.add_arc(1, 0, 1.0).unwrap();
        network.add_commodity(1, 0, 2.0).unwrap();
        network.set_discretization(1.0, 0.0);
        network.set_truck_capacity(2);
        network.set_loading_time(0.0);
        network.set_unloading_time(0.0);
        network
    }

    /// Property 8: writing a schedule and reading it back reproduces the
    /// header fields and every record row.
    #[test]
    fn round_trips_header_and_records() {
        let network = unit_network();
        let mut extracted = Extracted::default();
        extracted.trucks.push((0, 1, 0, 1));
        extracted.flows.push((0, 1, 0, 1, 0, 1.0));
        extracted.inventory.push((0, 0, 1, 0, 0.5));
        extracted.distance = 1.0;
        extracted.penalty = 0.0;
        extracted.unproduced = 0;
        extracted.undelivered = 0;

        let schedule = TruckSchedule::from_extracted(&network, &extracted);
        let mut buf = Vec::new();
        schedule.write(&mut buf).unwrap();
        let read_back = TruckSchedule::read(std::io::BufReader::new(buf.as_slice())).unwrap();

        assert_eq!(read_back.objective, schedule.objective);
        assert_eq!(read_back.distance, schedule.distance);
        assert_eq!(read_back.trucks, schedule.trucks);
        assert_eq!(read_back.flows, schedule.flows);
        assert_eq!(read_back.inventory, schedule.inventory);
    }

    #[test]
    fn to_warm_start_converts_wall_clock_back_to_ticks() {
        let network = unit_network();
        let mut extracted = Extracted::default();
        extracted.trucks.push((0, 1, 1, 2));
        let schedule = TruckSchedule::from_extracted(&network, &extracted);
        let starts = schedule.to_warm_start(&network);
        assert_eq!(starts.get(&(0, 1, 1)), Some(&2));
    }

    #[test]
    fn to_restriction_allows_recorded_arc_within_deviation() {
        let network = unit_network();
        let mut extracted = Extracted::default();
        extracted.trucks.push((0, 1, 0, 1));
        let schedule = TruckSchedule::from_extracted(&network, &extracted);
        let restriction = schedule.to_restriction(0.5);
        let mut backend = crate::solve::recording::RecordingBackend::default();
        let raw = vec![crate::trolley::RawTrolley { source: 0, release: 0.0, target: 1, shift: 0 }];
        let processed = crate::trolley::preprocess(&network, &raw, crate::trolley::PreprocessPolicy::Filter).unwrap();
        let vars = model::build(&network, &processed, Some(&restriction), &model::Penalties::default(), &mut backend).unwrap();
        let idx = backend.names.iter().position(|n| n == "x#0#1#0").unwrap();
        assert!(backend.ubs[idx] > 0.0);
    }

    #[test]
    fn missing_header_field_is_an_error() {
        let text = "OBJ 1.0\nDIST 1.0\nPEN 0.0\nNPRO 0\n\n";
        let result = TruckSchedule::read(std::io::BufReader::new(text.as_bytes()));
        assert_eq!(result, Err(ScheduleError::MissingHeaderField("NDEL")));
    }

    #[test]
    fn json_summary_round_trips_through_serde_value() {
        let network = unit_network();
        let mut extracted = Extracted::default();
        extracted.trucks.push((0, 1, 0, 1));
        extracted.distance = 1.0;
        let schedule = TruckSchedule::from_extracted(&network, &extracted);

        let text = schedule.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["distance"], 1.0);
        assert_eq!(value["trucks"][0]["count"], 1);
    }
}
