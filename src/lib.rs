//! # Bargain Server Library
//!
//! This library provides the core of a two-party alternating-offer
//! bargaining server. Players bargain over how to split a small catalog of
//! indivisible items, each holding private per-item values and an outside
//! option. Games are played directly by sharing a code, through a
//! quick-match queue, or as round-robin tournament matches.
//!
//! The [`lobby::Lobby`] consumes decoded client messages and returns the
//! effects they cause; the transport and record sink live outside the crate
//! behind the [`session::Tunnel`] and [`record::Recorder`] traits.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::ignored_unit_patterns)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::wildcard_imports)]

pub mod code;
pub mod config;
pub mod constants;
pub mod directory;
pub mod lobby;
pub mod negotiation;
pub mod offer;
pub mod protocol;
pub mod queue;
pub mod record;
pub mod registry;
pub mod session;
pub mod standings;
pub mod tournament;
pub mod valuation;
