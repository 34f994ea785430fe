// Drivers for instruments spoken to through `scpi::Instrument`.  Each one wraps a session and turns
// the instrument's SCPI dialect into typed setters, getters and transfers

pub mod mxo;
