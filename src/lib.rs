// External data representation, the serialization underneath RPC
pub mod xdr;

// Remote procedure call, which VXI-11 is built on
pub mod rpc;

// The instrument control protocol spoken by the oscilloscope
pub mod vxi11;

// Collaborator traits for the supply and scope, plus their concrete drivers
pub mod devices;

pub mod error;
pub mod config;

// Acquisition core: parse scope replies, dump events, take stop requests, drive the sweep
pub mod waveform;
pub mod output;
pub mod stop;
pub mod sweep;

pub use config::{EventLogScope, RunConfig, SweepConfig};
pub use error::{DaqError, DaqResult};
pub use stop::StopSignal;
pub use sweep::{DaqRunner, SweepReport, SweepState};
