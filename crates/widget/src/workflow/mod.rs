//! The search drawer: state machine, session and rendering.
//!
//! One drawer is open at a time. Opening it lowers host elements that would
//! cover it; closing restores them and releases everything the session
//! created (DOM, listeners, object URLs).

mod drawer;
mod pagination;
mod selection;
mod session;
mod state;
mod view;
mod zindex;

pub use drawer::{DrawerController, DrawerSnapshot, ItemScope, SearchOutcome};
pub use pagination::Paginator;
pub use selection::ItemSelection;
pub use session::Picker;
pub use state::DrawerState;
pub use view::DRAWER_ID;
pub use zindex::{DRAWER_Z_INDEX, ZIndexOverrides};
