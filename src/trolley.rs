//! Trolley preprocessing: filtering or repairing trolleys against the time
//! horizon, and computing the production/demand aggregates the model builder
//! consumes.

use crate::network::Network;
use std::collections::HashMap;
use std::io::Read;

/// A trolley as read from the input stream, before tick conversion.
#[derive(Debug, Clone, Copy)]
pub struct RawTrolley {
    pub source: usize,
    pub release: f64,
    pub target: usize,
    pub shift: i32,
}

/// A trolley after preprocessing: release has been converted to a tick and
/// is guaranteed deliverable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trolley {
    pub source: usize,
    pub release_tick: i64,
    pub target: usize,
    pub shift: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreprocessPolicy {
    /// Drop trolleys that cannot meet their deadline.
    Filter,
    /// Advance the release of trolleys that cannot meet their deadline just
    /// far enough that they can.
    Repair,
}

#[derive(Debug, Clone)]
pub enum TrolleyError {
    UnknownCommodity(usize, i32),
    ConservationMismatch { production_total: i64, demand_total: i64 },
}

impl std::fmt::Display for TrolleyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrolleyError::UnknownCommodity(target, shift) => {
                write!(f, "trolley references unknown commodity (target={}, shift={})", target, shift)
            }
            TrolleyError::ConservationMismatch { production_total, demand_total } => write!(
                f,
                "production/demand conservation violated: production={} demand={}",
                production_total, demand_total
            ),
        }
    }
}

impl std::error::Error for TrolleyError {}

/// Result of preprocessing a batch of raw trolleys.
#[derive(Debug, Clone)]
pub struct PreprocessResult {
    pub trolleys: Vec<Trolley>,
    /// `production[(location, tick, target, shift)] = count`.
    pub production: HashMap<(usize, i64, usize, i32), i64>,
    /// `demand[(target, shift)] = count`.
    pub demand: HashMap<(usize, i32), i64>,
    pub modified: usize,
    pub dropped_degenerate: usize,
    pub dropped_infeasible: usize,
}

impl PreprocessResult {
    /// `Σ production[i,t,k] = Σ demand[k]` for every commodity; a violation
    /// is a programmer error in preprocessing, not a data problem, and is
    /// fatal (§7 of the specification).
    pub fn assert_conservation(&self) -> Result<(), TrolleyError> {
        let production_total: i64 = self.production.values().sum();
        let demand_total: i64 = self.demand.values().sum();
        if production_total != demand_total {
            return Err(TrolleyError::ConservationMismatch { production_total, demand_total });
        }
        Ok(())
    }
}

/// Filter or repair `raw` against `network`'s deadlines, then aggregate the
/// surviving trolleys into production/demand tables.
///
/// Trolleys with `source == target` are always dropped as degenerate,
/// regardless of policy.
pub fn preprocess(network: &Network, raw: &[RawTrolley], policy: PreprocessPolicy) -> Result<PreprocessResult, TrolleyError> {
    let mut trolleys = Vec::with_capacity(raw.len());
    let mut modified = 0usize;
    let mut dropped_degenerate = 0usize;
    let mut dropped_infeasible = 0usize;

    for t in raw {
        if t.source == t.target {
            dropped_degenerate += 1;
            continue;
        }
        let commodity = network
            .commodity_index(t.target, t.shift)
            .ok_or(TrolleyError::UnknownCommodity(t.target, t.shift))?;
        let travel = network.travel_ticks(t.source, t.target);
        let deadline_tick = network.deadline_tick(commodity);
        let release_tick = network.release_tick(t.release);

        if release_tick + travel <= deadline_tick {
            trolleys.push(Trolley { source: t.source, release_tick, target: t.target, shift: t.shift });
            continue;
        }

        match policy {
            PreprocessPolicy::Filter => {
                dropped_infeasible += 1;
            }
            PreprocessPolicy::Repair => {
                let repaired_time = network.tick_time(deadline_tick - travel);
                let repaired_release_tick = network.release_tick(repaired_time);
                trolleys.push(Trolley {
                    source: t.source,
                    release_tick: repaired_release_tick,
                    target: t.target,
                    shift: t.shift,
                });
                modified += 1;
            }
        }
    }

    let mut production: HashMap<(usize, i64, usize, i32), i64> = HashMap::new();
    let mut demand: HashMap<(usize, i32), i64> = HashMap::new();
    for t in &trolleys {
        *production.entry((t.source, t.release_tick, t.target, t.shift)).or_insert(0) += 1;
        *demand.entry((t.target, t.shift)).or_insert(0) += 1;
    }

    Ok(PreprocessResult { trolleys, production, demand, modified, dropped_degenerate, dropped_infeasible })
}

/// Read the trolley-stream CSV: a header row, then one row per trolley with
/// `source_name, target_name, ..., shift, release_time` (the last two
/// columns are fixed; any columns between source and target are ignored).
pub fn read_csv<R: Read>(reader: R, network: &Network) -> Result<Vec<RawTrolley>, String> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let mut trolleys = Vec::new();
    for (row_index, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| format!("CSV read error on row {}: {}", row_index, e))?;
        if record.len() < 4 {
            log::warn!("skipping malformed trolley row {}: too few columns", row_index);
            continue;
        }
        let source_name = &record[0];
        let target_name = &record[1];
        let shift: i32 = match record[record.len() - 2].parse() {
            Ok(v) => v,
            Err(_) => {
                log::warn!("skipping malformed trolley row {}: bad shift", row_index);
                continue;
            }
        };
        let release: f64 = match record[record.len() - 1].parse() {
            Ok(v) => v,
            Err(_) => {
                log::warn!("skipping malformed trolley row {}: bad release time", row_index);
                continue;
            }
        };
        let source = match network.location_index(source_name) {
            Some(idx) => idx,
            None => {
                log::warn!("skipping trolley row {}: unknown source '{}'", row_index, source_name);
                continue;
            }
        };
        let target = match network.location_index(target_name) {
            Some(idx) => idx,
            None => {
                log::warn!("skipping trolley row {}: unknown target '{}'", row_index, target_name);
                continue;
            }
        };
        trolleys.push(RawTrolley { source, release, target, shift });
    }
    Ok(trolleys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Location;

    fn unit_network() -> Network {
        let mut network = Network::new();
        network.add_location(Location {
            name: "A".into(),
            x: 0.0,
            y: 0.0,
            source_capacity: 100,
            target_capacity: 100,
            cross_capacity: 0,
            num_docks: 4,
        });
        network.add_location(Location {
            name: "B".into(),
            x: 1.0,
            y: 0.0,
            source_capacity: 100,
            target_capacity: 100,
            cross_capacity: 0,
            num_docks: 4,
        });
        network.add_arc(0, 1, 1.0).unwrap();
        network.add_arc(1, 0, 1.0).unwrap();
        network.add_commodity(1, 0, 2.0).unwrap();
        network.set_discretization(1.0, 0.0);
        network.set_truck_capacity(2);
        network.set_loading_time(0.0);
        network.set_unloading_time(0.0);
        network
    }

    #[test]
    fn degenerate_trolleys_are_always_dropped() {
        let network = unit_network();
        let raw = vec![RawTrolley { source: 0, release: 0.0, target: 0, shift: 0 }];
        // source==target has no matching commodity by construction here, so
        // use a network where it would otherwise resolve to confirm drop
        // happens before commodity lookup.
        let result = preprocess(&network, &raw, PreprocessPolicy::Filter);
        // commodity (0,0) doesn't exist, but since source==target it is
        // dropped before the commodity lookup would fail.
        assert!(result.is_ok());
        assert_eq!(result.unwrap().dropped_degenerate, 1);
    }

    #[test]
    fn filter_mode_drops_infeasible_trolley() {
        let network = unit_network();
        let raw = vec![RawTrolley { source: 0, release: 2.0, target: 1, shift: 0 }];
        let result = preprocess(&network, &raw, PreprocessPolicy::Filter).unwrap();
        assert_eq!(result.trolleys.len(), 0);
        assert_eq!(result.dropped_infeasible, 1);
    }

    #[test]
    fn repair_mode_advances_release_and_counts_modification() {
        let network = unit_network();
        let raw = vec![RawTrolley { source: 0, release: 2.0, target: 1, shift: 0 }];
        let result = preprocess(&network, &raw, PreprocessPolicy::Repair).unwrap();
        assert_eq!(result.trolleys.len(), 1);
        assert_eq!(result.modified, 1);
        let trolley = result.trolleys[0];
        let travel = network.travel_ticks(trolley.source, trolley.target);
        let deadline_tick = network.deadline_tick(network.commodity_index(1, 0).unwrap());
        assert!(trolley.release_tick + travel <= deadline_tick);
        assert_eq!(trolley.release_tick, 1);
    }

    #[test]
    fn kept_trolleys_satisfy_deliverability() {
        let network = unit_network();
        let raw = vec![
            RawTrolley { source: 0, release: 0.0, target: 1, shift: 0 },
            RawTrolley { source: 0, release: 2.0, target: 1, shift: 0 },
        ];
        let result = preprocess(&network, &raw, PreprocessPolicy::Filter).unwrap();
        let deadline_tick = network.deadline_tick(network.commodity_index(1, 0).unwrap());
        for t in &result.trolleys {
            let travel = network.travel_ticks(t.source, t.target);
            assert!(t.release_tick + travel <= deadline_tick);
        }
    }

    #[test]
    fn aggregate_conservation_holds() {
        let network = unit_network();
        let raw = vec![
            RawTrolley { source: 0, release: 0.0, target: 1, shift: 0 },
            RawTrolley { source: 0, release: 0.0, target: 1, shift: 0 },
            RawTrolley { source: 0, release: 1.0, target: 1, shift: 0 },
        ];
        let result = preprocess(&network, &raw, PreprocessPolicy::Filter).unwrap();
        result.assert_conservation().unwrap();
        let demand_total: i64 = result.demand.values().sum();
        assert_eq!(demand_total, result.trolleys.len() as i64);
    }
}
