// SPDX-License-Identifier: GPL-3.0-only

//! Processing pipelines for photo and video capture
//!
//! Both pipelines consume frames without interrupting the live preview.
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Frame slots  │ ──▶ │  Photo Pipeline   │ ──▶ │ JPEG / PNG   │
//! │  (BGRA)      │     │  - BGRA→RGBA      │     │ bytes        │
//! │              │     │  - PiP composite  │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//!
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Capture      │ ──▶ │  Video Pipeline   │ ──▶ │ Recording    │
//! │ callback     │     │  - bounded queue  │     │ sink         │
//! │              │     │  - writer thread  │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```

pub mod photo;
pub mod video;
