//! Initiative.
//!
//! Turn order for the GM's participant list, and the rendered table that
//! players receive over the sync bus.

pub mod scheduler;
pub mod table;

pub use scheduler::{
    compute_order, condition_penalty, ConditionRow, InitiativeEntry, InitiativeScheduler,
    Penalties, SchedulerError, TurnSlot,
};
pub use table::{InitiativeTable, TableRow, TurnHint};
