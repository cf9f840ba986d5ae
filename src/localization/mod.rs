// Localization module

pub mod particle_filter;

pub use particle_filter::{PFControl, Particle, ParticleFilter, ParticleFilterConfig};
