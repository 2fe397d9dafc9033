//! External delivery channels for automation notifications.

pub mod webhook;
