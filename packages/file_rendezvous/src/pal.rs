// Platform abstraction layer for file_rendezvous.
//
// Every touch of the shared storage goes through here so that tests can inject torn reads,
// missing files and I/O failures. The pattern is the usual three layers: abstraction (trait),
// facade (enum) and the real implementation that forwards to the operating system.

mod storage;

pub(crate) use storage::*;
