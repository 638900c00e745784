//! End-to-end tests that load contracts from disk through the public facade.
