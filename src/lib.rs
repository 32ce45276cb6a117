//! # scanbook
//!
//! A barcode inventory log. Codes read from a camera feed, an uploaded photo
//! or a phone posting to `/scan` are filed into user-named sections,
//! recorded in SQLite with the time they were first seen, and exported as
//! JSON or CSV.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌────────────┐
//! │ Camera/Upload│──▶│  Inventory   │──▶│   SQLite    │
//! │ /scan client │   │ window+lock  │   │ sections +  │
//! └──────────────┘   └──────────────┘   │ barcodes    │
//!                                       └─────┬──────┘
//!                        ┌────────────────────┤
//!                        ▼                    ▼
//!                  ┌───────────┐        ┌───────────┐
//!                  │ data.json │        │ JSON/CSV  │
//!                  │ projection│        │  exports  │
//!                  └───────────┘        └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! scanbook init                 # create database, seed sections
//! scanbook serve                # start HTTP server
//! scanbook sections             # print sections and their codes
//! scanbook export -o out.csv    # dump history as CSV
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations and first-run seeding |
//! | [`sqlite_store`] | SQLite section store |
//! | [`snapshot`] | JSON file projection of the store |
//! | [`inventory`] | Shared state: active section, scan window, lock |
//! | [`decoder`] | Barcode decoding seam |
//! | [`annotate`] | Frame outlining and JPEG encoding |
//! | [`camera`] | Capture loop and MJPEG stream |
//! | [`export`] | CSV export |
//! | [`flash`] | One-shot status messages |
//! | [`server`] | HTTP server |

pub mod annotate;
pub mod camera;
pub mod config;
pub mod db;
pub mod decoder;
pub mod export;
pub mod flash;
pub mod inventory;
pub mod migrate;
pub mod server;
pub mod snapshot;
pub mod sqlite_store;
