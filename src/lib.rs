//! Distributed block-sparse interpolation between vectors of
//! different sizes, for multigrid restriction and prolongation.
//!
//! The central type is [`Interp`]: a rectangular operator between two
//! block-partitioned index spaces. Rows are staged from any rank with
//! [`Interp::add_row`], routed to their owners and assembled into a
//! local/remote CSR pair by the collective [`Interp::finalize`], and
//! then applied with [`Interp::apply`] (prolongation) or
//! [`Interp::apply_transpose`] (restriction), overlapping the remote
//! column traffic with the owned-column multiply.
//!
//! # Features
//!
//! - `distributed`: MPI transport via the `mpi` crate. Without it the
//!   crate runs single-process through [`SingleProcessComm`].
//! - `complex`: `Complex64` weights and vector components instead of
//!   `f64`.

pub mod comm;
#[cfg(feature = "distributed")]
pub mod comm_mpi;
pub mod error;
pub mod halo;
pub mod interp;
pub mod map;
pub mod scalar;
pub mod vector;

mod assemble;
mod kernels;
mod staging;

// Re-exports for convenience
pub use comm::{Combine, Communicator, SingleProcessComm};
#[cfg(feature = "distributed")]
pub use comm_mpi::MpiComm;
pub use error::{InterpError, Result};
pub use halo::HaloExchange;
pub use interp::Interp;
pub use map::IndexMap;
pub use scalar::Scalar;
pub use vector::DistVector;
