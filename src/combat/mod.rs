//! Combat resolver: validates and applies one card play.

pub mod resolver;

pub use resolver::{apply_card_play, CardPlay, ENEMY_TARGET};
