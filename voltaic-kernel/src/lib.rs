//! Voltaic kernel - acquisition de télémétrie véhicule et scoring santé batterie
//!
//! Le kernel transforme la primitive "réveille un véhicule endormi" du cloud
//! constructeur en acquisitions fiables et bornées, score l'état batterie de
//! deux façons indépendantes et expose le tout via une API REST.

pub mod client;
pub mod comparison;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod models;
pub mod probe;
pub mod scoring;
pub mod validator;
pub mod wake;

use parking_lot::Mutex;
use std::sync::Arc;

/// État partagé entre handlers et tâches de fond.
pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}
