//! Manager-side auth glue: token issuance and verification are the
//! stateless `league_protocol::token` machinery (shared with Referee and
//! Player, which verify locally off the signing secret handed to them
//! at registration — see DESIGN.md). Nothing cryptographic is
//! Manager-specific; this module just re-exports what `coordinator.rs`
//! and `main.rs` need.

pub use league_protocol::token::{generate_signing_secret, issue};
