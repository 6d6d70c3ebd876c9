//! Feedvault Server Library
//!
//! HTTP front for the ingestion pipeline. A POST starts a background run for
//! one provider and answers immediately with a job id; a GET on that id
//! reports progress until the run reaches a terminal status.
//!
//! | Method | Path                  | Response                           |
//! |--------|-----------------------|------------------------------------|
//! | GET    | `/health`             | 200                                |
//! | GET    | `/api/v1/providers`   | registered provider names          |
//! | POST   | `/api/v1/jobs/{name}` | 202, 404 unknown, 409 running      |
//! | GET    | `/api/v1/jobs/{id}`   | job snapshot, 404 unknown          |

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;

pub use routes::{router, AppState};
pub use server::serve;
