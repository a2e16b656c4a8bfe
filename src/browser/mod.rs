//! Browser action adapter
//!
//! The action model, coordinate denormalization, the CDP page driver, and
//! request interception.

mod actions;
mod adapter;
mod interception;

pub use actions::{
    Action, ActionOutcome, NORMALIZED_RANGE, ScrollDirection, denormalize, normalize,
};
pub use adapter::{
    BrowserConnector, CdpConnector, CdpPage, NAVIGATION_DEADLINE, PageDriver, Screenshot,
};
pub use interception::{InterceptionPolicy, install_request_interception};
