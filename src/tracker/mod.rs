//! Trofos tracker: projects, sprints and backlog items behind a JSON API.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │  (SPA)   │ <─────── │    └─ api/  (route handlers, AppState, ApiError) │
//! └──────────┘   JSON   │         │                                        │
//!                       │         │ CurrentUser (session cookie)           │
//!                       │         v                                        │
//!                       │  auth.rs    (password hashing, cookies)          │
//!                       │  policy.rs  (role actions + ownership policies)  │
//!                       │         │                                        │
//!                       │         │ DbHandle::call(|db| ...)               │
//!                       │         v                                        │
//!                       │  db/        (TrackerDb over rusqlite)            │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! Domain types and the burndown fold live in the `trofos-common` crate.
//!
//! ## Typical Request Flow (start a sprint)
//!
//! 1. `PUT /api/projects/{id}/sprints/{sprint_id}/status` with
//!    `{"status": "current"}` → `api::sprints::set_status()`
//! 2. The `CurrentUser` extractor resolves the `trofos_sessioncookie` cookie
//!    to a live session, or rejects with 401.
//! 3. `policy::authorize()` checks the role carries `update_project` and the
//!    user is a member of the project, or rejects with 403.
//! 4. `TrackerDb::set_sprint_status()` runs the transition in one
//!    transaction; an existing current sprint aborts it with 409.

pub mod api;
pub mod auth;
pub mod db;
pub mod policy;
pub mod server;
