//! Arcade stick input pipeline
//!
//! Samples twelve buttons, a force sensor and a potentiometer, turns them
//! into discrete events and reports them to a host as a gamepad, a keyboard
//! or a keyboard with volume control.

pub mod config;
pub mod controller;
pub mod mapping;
pub mod transport;
