// Path planning module: reactive steering

pub mod vfh;

pub use vfh::{HeadingControl, HeadingControlConfig, PolarHistogram, PolarHistogramConfig, Valley};
