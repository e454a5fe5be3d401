// Application-layer ports for the outbound collaborators.
pub mod ports;
