//! Web surface: one page at `/`, HTML in, HTML out.
//!
//! `GET /?codrequisicao=<code>` runs the analysis on a blocking worker and
//! renders it; `POST /` redirects to that URL.

pub mod error;
pub mod page;
pub mod router;
pub mod server;

pub use router::app_router;
pub use server::{ctrl_c_signal, serve};
