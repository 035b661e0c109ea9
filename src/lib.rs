//! Time-expanded multi-commodity network design solver.
//!
//! Given a static network of depots and cross-docks, pairwise drive times and
//! a stream of "trolley" shipments (each with an origin, a destination, a
//! release time and a deadline), this crate builds and solves a mixed-integer
//! program deciding which trucks run between which locations at which
//! discrete ticks, and how each trolley is routed through that time-expanded
//! network.
//!
//! # Example
//!
//! ```no_run
//! use trolleynet_solver::network::Network;
//! use trolleynet_solver::trolley::{self, PreprocessPolicy};
//!
//! let network = Network::read(std::io::BufReader::new(
//!     std::fs::File::open("network.txt").unwrap(),
//! )).unwrap();
//! let raw = trolley::read_csv(std::fs::File::open("trolleys.csv").unwrap(), &network).unwrap();
//! let processed = trolley::preprocess(&network, &raw, PreprocessPolicy::Filter).unwrap();
//! println!("kept {} trolleys", processed.trolleys.len());
//! ```

pub mod network;
pub mod trolley;
pub mod model;
pub mod solve;
pub mod schedule;
pub mod refine;

pub use network::Network;
pub use trolley::Trolley;
