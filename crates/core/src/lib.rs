pub mod audit;
pub mod category;
pub mod config;
pub mod errors;
pub mod extract;
pub mod flows;
pub mod legacy_filter;
pub mod ports;
pub mod render;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use category::{Category, UnknownCategory};
pub use errors::{ApplicationError, DomainError, IntegrationError, InterfaceError};
pub use extract::{extract_delta, ControlIntent, ExtractedDelta, ExtractionContext, OpenItemPreference};
pub use flows::{
    ActiveIntent, ClassifierSeed, FilterState, InMemorySessionStore, IntentLockRouter, InvoiceStep,
    MissingFilter, QueryStateReducer, RoutedCategory, SessionStore,
};
pub use legacy_filter::{LegacyField, LegacyFilter};
pub use ports::{
    AnalyticsResult, CustomerAnalytics, DocumentLink, EStatus, InvoiceDocuments, InvoiceRecord,
    InvoiceSearch, Precheck, SearchOptions, SearchPage, StatementDocuments, StatementRequest,
    UsageLogger, UsageRecord,
};
