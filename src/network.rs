//! Static network geography: locations, pairwise distances, commodities, and
//! the tick arithmetic that turns continuous times into the integer ticks the
//! rest of the crate works in.
//!
//! Locations are identified by a dense `usize` index assigned in insertion
//! order. The arc set is expected to be complete on every ordered pair of
//! distinct locations; [`Network::validate`] checks this along with the other
//! build-time invariants the tick arithmetic depends on.

use std::collections::HashMap;
use std::io::{BufRead, Write};

/// A depot or cross-dock.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub source_capacity: i64,
    pub target_capacity: i64,
    pub cross_capacity: i64,
    pub num_docks: i64,
}

impl Location {
    /// A location is a cross-dock iff its cross capacity is positive.
    pub fn is_cross(&self) -> bool {
        self.cross_capacity > 0
    }
}

/// A (target, shift) pair with its delivery deadline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Commodity {
    pub target: usize,
    pub shift: i32,
    pub deadline: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NetworkError {
    UnknownLocation(String),
    InvalidLocationIndex(usize),
    DuplicateCommodity(usize, i32),
    MissingArc(usize, usize),
    MissingDiscretization,
    MissingTruckCapacity,
    MissingLoadingTime,
    MissingUnloadingTime,
    Parse(String),
    Io(String),
}

impl std::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkError::UnknownLocation(name) => write!(f, "unknown location: {}", name),
            NetworkError::InvalidLocationIndex(idx) => write!(f, "invalid location index: {}", idx),
            NetworkError::DuplicateCommodity(target, shift) => {
                write!(f, "duplicate commodity (target={}, shift={})", target, shift)
            }
            NetworkError::MissingArc(i, j) => write!(f, "missing arc ({} -> {})", i, j),
            NetworkError::MissingDiscretization => write!(f, "discretization not set"),
            NetworkError::MissingTruckCapacity => write!(f, "truck capacity not set"),
            NetworkError::MissingLoadingTime => write!(f, "loading time not set"),
            NetworkError::MissingUnloadingTime => write!(f, "unloading time not set"),
            NetworkError::Parse(msg) => write!(f, "parse error: {}", msg),
            NetworkError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for NetworkError {}

/// Static geography plus discretisation parameters.
///
/// Build with [`Network::new`], [`Network::add_location`],
/// [`Network::add_arc`], [`Network::add_commodity`] and the `set_*` methods,
/// then call [`Network::validate`] once before using the tick-arithmetic
/// queries (the builder methods themselves stay infallible and cheap).
#[derive(Debug, Clone, Default)]
pub struct Network {
    locations: Vec<Location>,
    name_to_index: HashMap<String, usize>,
    distances: HashMap<(usize, usize), f64>,
    commodities: Vec<Commodity>,
    commodity_index: HashMap<(usize, i32), usize>,
    truck_capacity: Option<i64>,
    loading_time: Option<f64>,
    unloading_time: Option<f64>,
    tick_hours: Option<f64>,
    tick_zero: f64,
}

impl Network {
    pub fn new() -> Self {
        Network::default()
    }

    pub fn add_location(&mut self, location: Location) -> usize {
        let idx = self.locations.len();
        self.name_to_index.insert(location.name.clone(), idx);
        self.locations.push(location);
        idx
    }

    pub fn add_arc(&mut self, source: usize, target: usize, distance: f64) -> Result<(), NetworkError> {
        if source >= self.locations.len() {
            return Err(NetworkError::InvalidLocationIndex(source));
        }
        if target >= self.locations.len() {
            return Err(NetworkError::InvalidLocationIndex(target));
        }
        self.distances.insert((source, target), distance);
        Ok(())
    }

    pub fn add_commodity(&mut self, target: usize, shift: i32, deadline: f64) -> Result<usize, NetworkError> {
        if target >= self.locations.len() {
            return Err(NetworkError::InvalidLocationIndex(target));
        }
        if self.commodity_index.contains_key(&(target, shift)) {
            return Err(NetworkError::DuplicateCommodity(target, shift));
        }
        let idx = self.commodities.len();
        self.commodity_index.insert((target, shift), idx);
        self.commodities.push(Commodity { target, shift, deadline });
        Ok(idx)
    }

    pub fn set_discretization(&mut self, tick_hours: f64, tick_zero: f64) {
        self.tick_hours = Some(tick_hours);
        self.tick_zero = tick_zero;
    }

    pub fn set_truck_capacity(&mut self, capacity: i64) {
        self.truck_capacity = Some(capacity);
    }

    pub fn set_loading_time(&mut self, hours: f64) {
        self.loading_time = Some(hours);
    }

    pub fn set_unloading_time(&mut self, hours: f64) {
        self.unloading_time = Some(hours);
    }

    /// Check every invariant the tick-arithmetic queries below rely on:
    /// discretisation and the (un)loading times and truck capacity are set,
    /// and the arc set is complete on every ordered pair of distinct
    /// locations. Call once before handing the network to the model builder.
    pub fn validate(&self) -> Result<(), NetworkError> {
        if self.tick_hours.is_none() {
            return Err(NetworkError::MissingDiscretization);
        }
        if self.truck_capacity.is_none() {
            return Err(NetworkError::MissingTruckCapacity);
        }
        if self.loading_time.is_none() {
            return Err(NetworkError::MissingLoadingTime);
        }
        if self.unloading_time.is_none() {
            return Err(NetworkError::MissingUnloadingTime);
        }
        for i in 0..self.locations.len() {
            for j in 0..self.locations.len() {
                if i != j && !self.distances.contains_key(&(i, j)) {
                    return Err(NetworkError::MissingArc(i, j));
                }
            }
        }
        Ok(())
    }

    pub fn num_locations(&self) -> usize {
        self.locations.len()
    }

    pub fn location(&self, index: usize) -> &Location {
        &self.locations[index]
    }

    pub fn location_index(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn locations(&self) -> impl Iterator<Item = (usize, &Location)> {
        self.locations.iter().enumerate()
    }

    pub fn commodities(&self) -> impl Iterator<Item = (usize, &Commodity)> {
        self.commodities.iter().enumerate()
    }

    pub fn commodity_index(&self, target: usize, shift: i32) -> Option<usize> {
        self.commodity_index.get(&(target, shift)).copied()
    }

    pub fn commodity(&self, index: usize) -> &Commodity {
        &self.commodities[index]
    }

    pub fn is_cross(&self, location: usize) -> bool {
        self.locations[location].is_cross()
    }

    pub fn distance(&self, source: usize, target: usize) -> f64 {
        *self.distances.get(&(source, target)).expect("Network::validate was not called")
    }

    fn tick_hours(&self) -> f64 {
        self.tick_hours.expect("Network::validate was not called")
    }

    fn loading_time(&self) -> f64 {
        self.loading_time.expect("Network::validate was not called")
    }

    fn unloading_time(&self) -> f64 {
        self.unloading_time.expect("Network::validate was not called")
    }

    pub fn truck_capacity(&self) -> i64 {
        self.truck_capacity.expect("Network::validate was not called")
    }

    pub fn tick_zero(&self) -> f64 {
        self.tick_zero
    }

    /// Tick of a release time: `ceil((time - tickZero) / Δt)`.
    pub fn release_tick(&self, time: f64) -> i64 {
        ((time - self.tick_zero) / self.tick_hours()).ceil() as i64
    }

    /// Tick of a deadline: `floor((deadline - tickZero) / Δt)`.
    pub fn deadline_tick(&self, commodity: usize) -> i64 {
        let deadline = self.commodities[commodity].deadline;
        ((deadline - self.tick_zero) / self.tick_hours()).floor() as i64
    }

    /// Inverse of `release_tick`: the wall-clock time a tick boundary falls on.
    pub fn tick_time(&self, tick: i64) -> f64 {
        self.tick_hours() * tick as f64 + self.tick_zero
    }

    pub fn distance_ticks(&self, source: usize, target: usize) -> i64 {
        (self.distance(source, target) / self.tick_hours()).ceil() as i64
    }

    /// `⌈unloadingTime/Δt⌉`.
    pub fn unloading_ticks(&self) -> i64 {
        (self.unloading_time() / self.tick_hours()).ceil() as i64
    }

    /// The residual after `unloading_ticks` is subtracted from the combined
    /// rounding of loading+unloading time — *not* an independently rounded
    /// `⌈loadingTime/Δt⌉`, so the two always sum to exactly
    /// `⌈(unloadingTime+loadingTime)/Δt⌉`.
    pub fn loading_ticks(&self) -> i64 {
        let combined = ((self.unloading_time() + self.loading_time()) / self.tick_hours()).ceil() as i64;
        combined - self.unloading_ticks()
    }

    pub fn travel_ticks(&self, source: usize, target: usize) -> i64 {
        let hours = self.distance(source, target) + self.loading_time() + self.unloading_time();
        (hours / self.tick_hours()).ceil() as i64
    }

    pub fn num_docks_per_tick(&self, location: usize) -> i64 {
        let combined = self.loading_time() + self.unloading_time();
        let per_tick = (self.tick_hours() / combined).ceil() as i64;
        self.locations[location].num_docks * per_tick
    }

    /// Write the Network-file text format: `U`/`i`/`o` header, blank line,
    /// `l` lines (one per location), blank line, `d` lines (one per ordered
    /// arc), blank line, `c` lines (one per commodity), blank line.
    pub fn write<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        writeln!(w, "U {}", self.truck_capacity.unwrap_or(0))?;
        writeln!(w, "i {}", self.unloading_time.unwrap_or(0.0))?;
        writeln!(w, "o {}", self.loading_time.unwrap_or(0.0))?;
        writeln!(w)?;
        for location in &self.locations {
            writeln!(
                w,
                "l {} {} {} {} {} {} {}",
                location.name,
                location.x,
                location.y,
                location.source_capacity,
                location.target_capacity,
                location.cross_capacity,
                location.num_docks
            )?;
        }
        writeln!(w)?;
        for i in 0..self.locations.len() {
            for j in 0..self.locations.len() {
                if i == j {
                    continue;
                }
                if let Some(distance) = self.distances.get(&(i, j)) {
                    writeln!(w, "d {} {} {}", i, j, distance)?;
                }
            }
        }
        writeln!(w)?;
        for commodity in &self.commodities {
            writeln!(w, "c {} {} {}", commodity.target, commodity.shift, commodity.deadline)?;
        }
        writeln!(w)?;
        Ok(())
    }

    /// Read the Network-file text format written by [`Network::write`]. An
    /// unrecognised leading tag is logged and the line skipped; a malformed
    /// field on a recognised tag is a parse error.
    pub fn read<R: BufRead>(r: R) -> Result<Self, NetworkError> {
        let mut network = Network::new();
        let mut truck_capacity: Option<i64> = None;
        let mut unloading_time: Option<f64> = None;
        let mut loading_time: Option<f64> = None;

        for line in r.lines() {
            let line = line.map_err(|e| NetworkError::Io(e.to_string()))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let tag = parts.next().unwrap_or("");
            let rest: Vec<&str> = parts.collect();
            match tag {
                "U" => {
                    truck_capacity = Some(parse_field(&rest, 0, "truck capacity")?);
                }
                "i" => {
                    unloading_time = Some(parse_field(&rest, 0, "unloading hours")?);
                }
                "o" => {
                    loading_time = Some(parse_field(&rest, 0, "loading hours")?);
                }
                "l" => {
                    if rest.len() < 6 {
                        return Err(NetworkError::Parse(format!("malformed location line: {}", line)));
                    }
                    let name = rest[0].to_string();
                    let x: f64 = parse_field(&rest, 1, "location x")?;
                    let y: f64 = parse_field(&rest, 2, "location y")?;
                    let source_capacity: i64 = parse_field(&rest, 3, "source capacity")?;
                    let target_capacity: i64 = parse_field(&rest, 4, "target capacity")?;
                    let cross_capacity: i64 = parse_field(&rest, 5, "cross capacity")?;
                    let num_docks: i64 = parse_field(&rest, 6, "num docks")?;
                    network.add_location(Location {
                        name,
                        x,
                        y,
                        source_capacity,
                        target_capacity,
                        cross_capacity,
                        num_docks,
                    });
                }
                "d" => {
                    let source: usize = parse_field(&rest, 0, "arc source")?;
                    let target: usize = parse_field(&rest, 1, "arc target")?;
                    let distance: f64 = parse_field(&rest, 2, "arc distance")?;
                    network.add_arc(source, target, distance)?;
                }
                "c" => {
                    let target: usize = parse_field(&rest, 0, "commodity target")?;
                    let shift: i32 = parse_field(&rest, 1, "commodity shift")?;
                    let deadline: f64 = parse_field(&rest, 2, "commodity deadline")?;
                    network.add_commodity(target, shift, deadline)?;
                }
                other => {
                    log::warn!("skipping unknown network record tag: {}", other);
                }
            }
        }

        network.truck_capacity = Some(truck_capacity.ok_or(NetworkError::MissingTruckCapacity)?);
        network.unloading_time = Some(unloading_time.ok_or(NetworkError::MissingUnloadingTime)?);
        network.loading_time = Some(loading_time.ok_or(NetworkError::MissingLoadingTime)?);
        Ok(network)
    }
}

fn parse_field<T: std::str::FromStr>(fields: &[&str], index: usize, what: &str) -> Result<T, NetworkError> {
    fields
        .get(index)
        .ok_or_else(|| NetworkError::Parse(format!("missing {}", what)))?
        .parse()
        .map_err(|_| NetworkError::Parse(format!("invalid {}", what)))
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn validate_passes_for_complete_network() {
        assert!(unit_network().validate().is_ok());
    }

    #[test]
    fn validate_fails_on_missing_arc() {
        let mut network = Network::new();
        network.add_location(Location {
            name: "A".into(),
            x: 0.0,
            y: 0.0,
            source_capacity: 0,
            target_capacity: 0,
            cross_capacity: 0,
            num_docks: 1,
        });
        network.add_location(Location {
            name: "B".into(),
            x: 0.0,
            y: 0.0,
            source_capacity: 0,
            target_capacity: 0,
            cross_capacity: 0,
            num_docks: 1,
        });
        network.set_discretization(1.0, 0.0);
        network.set_truck_capacity(1);
        network.set_loading_time(0.0);
        network.set_unloading_time(0.0);
        assert_eq!(network.validate(), Err(NetworkError::MissingArc(0, 1)));
    }

    #[test]
    fn tick_round_trip() {
        let network = unit_network();
        for tick in -5..5 {
            assert_eq!(network.release_tick(network.tick_time(tick)), tick);
        }
    }

    #[test]
    fn deadline_tick_rounds_down() {
        let mut network = unit_network();
        network.set_discretization(2.0, 0.0);
        // deadline at 2.0 with commodity index 0 (deadline=2.0) -> floor(2.0/2.0) = 1
        assert_eq!(network.deadline_tick(0), 1);
    }

    #[test]
    fn loading_and_unloading_ticks_sum_to_combined_rounding() {
        let mut network = unit_network();
        network.set_discretization(1.0, 0.0);
        network.set_loading_time(0.7);
        network.set_unloading_time(0.6);
        let combined = ((0.7f64 + 0.6) / 1.0).ceil() as i64;
        assert_eq!(network.loading_ticks() + network.unloading_ticks(), combined);
    }

    #[test]
    fn network_file_round_trips() {
        let network = unit_network();
        let mut buf = Vec::new();
        network.write(&mut buf).unwrap();
        let read_back = Network::read(std::io::BufReader::new(buf.as_slice())).unwrap();
        assert_eq!(read_back.num_locations(), network.num_locations());
        assert_eq!(read_back.location(0).name, "A");
        assert_eq!(read_back.location(1).name, "B");
        assert_eq!(read_back.distance(0, 1), 1.0);
        assert_eq!(read_back.commodity(0).deadline, 2.0);
    }

    #[test]
    fn unknown_tag_is_skipped_not_fatal() {
        let mut network = unit_network();
        let mut buf = Vec::new();
        network.write(&mut buf).unwrap();
        let mut text = String::from_utf8(buf).unwrap();
        text.push_str("q this is not a real record\n");
        let read_back = Network::read(std::io::BufReader::new(text.as_bytes())).unwrap();
        assert_eq!(read_back.num_locations(), network.num_locations());
        let _ = &mut network;
    }
}
