//! Client-side mirror of a remote object-store container as a navigable
//! folder tree, with optimistic mutations reconciled against the backend.

pub mod config;
pub mod error;
pub mod event;
pub mod keymap;
pub mod mutation;
pub mod remote;
pub mod session;
pub mod tree;
pub mod view;
