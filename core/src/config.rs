//! Backend type aliases used across the cel crates.

/// CPU backend, always available. Used as the reference backend in tests.
pub type CpuBackend = burn::backend::NdArray;

pub type CpuAutodiffBackend = burn::backend::Autodiff<CpuBackend>;

#[cfg(feature = "cuda")]
pub type GpuBackend = burn::backend::Cuda;

#[cfg(all(feature = "wgpu", not(feature = "cuda")))]
pub type GpuBackend = burn::backend::Wgpu;

#[cfg(any(feature = "wgpu", feature = "cuda"))]
pub type GpuAutodiffBackend = burn::backend::Autodiff<GpuBackend>;
