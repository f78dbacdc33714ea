use super::*;

mod engine;
mod io_render;
mod remote;

pub(in crate::cli) use engine::*;
pub(in crate::cli) use io_render::*;
pub(in crate::cli) use remote::*;
