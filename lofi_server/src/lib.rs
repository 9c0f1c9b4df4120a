// lofi_server: HTTP trigger for the lofi generator.
//
// Exposes training and generation over plain GET requests so they can be
// started remotely. Each trigger starts a background job through
// `lofi_generator::jobs::JobRunner` and answers immediately with the job id;
// `/jobs/<id>` reports how it went.
//
// Module overview:
// - `routes.rs`: Pure URL -> reply mapping, bearer-token check, JSON bodies.
// - `server.rs`: `tiny_http` listener thread and the stop handle.
//
// Runs standalone via `main.rs` or embedded through `start_server`.

pub mod routes;
pub mod server;

pub use server::{ServerConfig, ServerError, ServerHandle, start_server};
