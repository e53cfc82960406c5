//! Deterministic conversation flows: session state, the intent lock, and
//! the invoice query reducer.

pub mod reducer;
pub mod router;
pub mod session;
pub mod states;

pub use reducer::{
    apply_patches, ClassifierSeed, FieldPatch, FilterField, InvoiceStep, MergePolicy, PageMove,
    QueryStateReducer, Reduction, ResultWindow, DEFAULT_REFINE_THRESHOLD,
};
pub use router::{
    IntentLockRouter, RouteDecision, RouteReason, RoutedCategory, DEFAULT_SHORT_FOLLOWUP_CHARS,
};
pub use session::{InMemorySessionStore, SessionStore, DEFAULT_SESSION_TTL_SECS};
pub use states::{ActiveIntent, FilterState, MissingFilter, PAGE_SIZE};
