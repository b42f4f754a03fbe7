pub mod logger;
pub mod error;
pub mod geometry;
pub mod pixels;
pub mod platform;
pub mod hue_mapper;
pub mod lut;
pub mod coalesce;
pub mod visibility;
pub mod zorder;
pub mod tracker;
pub mod change;
pub mod capture_cache;
pub mod compositor;
pub mod config;
pub mod engine;
pub mod scheduler;

pub use logger::*;
pub use config::{Config, EngineSettings, HueConfig};
pub use engine::{OverlayEngine, TickReport};
pub use geometry::Rect;
pub use hue_mapper::HueMapper;
pub use lut::ColorLut;
pub use pixels::PixelBuffer;
