//! Invoice query state machine.
//!
//! A turn folds three sources into the conversation's filter state, in a
//! fixed order: classifier seed (first turn only), invoice-number
//! derivation, then the per-turn delta. Later non-empty values win, except
//! that `open_item` can be explicitly cleared.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::extract::{
    derive_from_invoice_number, extract_date_range, extract_delta, invoice::digits_only,
    normalize_date_pair, ExtractedDelta, ExtractionContext,
};
use crate::legacy_filter::LegacyFilter;
use crate::ports::{SearchOptions, DEFAULT_SEARCH_TIMEOUT};

use super::session::SessionStore;
use super::states::{ActiveIntent, FilterState, MissingFilter};

pub const DEFAULT_REFINE_THRESHOLD: u64 = 50;

/// Structured fields the classifier extracted on the turn that opened the
/// flow. Empty strings mean "not provided".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierSeed {
    pub company_code: String,
    pub fiscal_year: String,
    /// `Some("X")` or `Some("")` when the classifier said so explicitly.
    pub open_item: Option<String>,
    /// Free text such as `January 2024`.
    pub date_range: String,
    pub date_from: String,
    pub date_to: String,
    /// Legacy `Key='value'&...` filter string.
    pub legacy_query: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterField {
    CompanyCode,
    FiscalYear,
    DateFrom,
    DateTo,
    AccountingDocument,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergePolicy {
    /// Only writes into an unset field.
    FillEmpty,
    /// Writes whenever the patch value is non-empty.
    Overwrite,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPatch {
    pub field: FilterField,
    pub value: String,
    pub policy: MergePolicy,
}

impl FieldPatch {
    pub fn fill(field: FilterField, value: impl Into<String>) -> Self {
        Self { field, value: value.into(), policy: MergePolicy::FillEmpty }
    }

    pub fn overwrite(field: FilterField, value: impl Into<String>) -> Self {
        Self { field, value: value.into(), policy: MergePolicy::Overwrite }
    }

    /// Empty patch values never clear a populated field.
    pub fn apply(&self, state: &mut FilterState) {
        let value = self.value.trim();
        if value.is_empty() {
            return;
        }
        let slot = match self.field {
            FilterField::CompanyCode => &mut state.company_code,
            FilterField::FiscalYear => &mut state.fiscal_year,
            FilterField::DateFrom => &mut state.date_from,
            FilterField::DateTo => &mut state.date_to,
            FilterField::AccountingDocument => &mut state.accounting_document,
        };
        if self.policy == MergePolicy::Overwrite || slot.is_empty() {
            *slot = value.to_string();
        }
    }
}

pub fn apply_patches(state: &mut FilterState, patches: &[FieldPatch]) {
    for patch in patches {
        patch.apply(state);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageMove {
    /// Filters changed; the cursor went back to the first page.
    Restart,
    Next,
    Previous,
    Stay,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reduction {
    pub state: FilterState,
    pub delta: ExtractedDelta,
    pub page_move: PageMove,
    pub first_turn: bool,
}

impl Reduction {
    pub fn missing_filters(&self) -> Vec<MissingFilter> {
        self.state.missing_filters()
    }
}

/// What the invoice flow should do after reducing a turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvoiceStep {
    NeedsFilters { state: FilterState, missing: Vec<MissingFilter> },
    Search { state: FilterState, legacy_filter: String, options: SearchOptions },
}

impl InvoiceStep {
    pub fn state(&self) -> &FilterState {
        match self {
            Self::NeedsFilters { state, .. } | Self::Search { state, .. } => state,
        }
    }
}

/// Counts derived from one result page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultWindow {
    pub skip: u64,
    pub returned: u64,
    pub total_count: u64,
    pub shown_so_far: u64,
    pub has_more: bool,
    pub needs_refine: bool,
}

impl ResultWindow {
    /// An unknown total falls back to the number of rows returned.
    pub fn new(skip: u64, returned: u64, total_count: Option<u64>, refine_threshold: u64) -> Self {
        let total_count = total_count.unwrap_or(returned);
        let shown_so_far = total_count.min(skip.saturating_add(returned));
        Self {
            skip,
            returned,
            total_count,
            shown_so_far,
            has_more: shown_so_far < total_count,
            needs_refine: total_count > refine_threshold,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryStateReducer {
    refine_threshold: u64,
    search_timeout: std::time::Duration,
}

impl Default for QueryStateReducer {
    fn default() -> Self {
        Self::new(DEFAULT_REFINE_THRESHOLD, DEFAULT_SEARCH_TIMEOUT)
    }
}

impl QueryStateReducer {
    pub fn new(refine_threshold: u64, search_timeout: std::time::Duration) -> Self {
        Self { refine_threshold, search_timeout }
    }

    pub fn refine_threshold(&self) -> u64 {
        self.refine_threshold
    }

    /// Pure part of a turn: seed, merge the delta, and move the page cursor.
    pub fn reduce(
        &self,
        existing: Option<FilterState>,
        user_text: &str,
        seed: &ClassifierSeed,
        now: DateTime<Utc>,
    ) -> Reduction {
        let first_turn = existing.is_none();
        let mut state = existing.unwrap_or_else(|| FilterState::new(ActiveIntent::Invoice, now));
        state.active_intent = ActiveIntent::Invoice;
        state.intent_locked = true;

        if first_turn {
            seed_state(&mut state, seed, user_text, now.year());
        }

        let delta = extract_delta(user_text, ExtractionContext::new(&state.fiscal_year, now.year()));
        merge_delta(&mut state, &delta);

        let page_move = paginate(&mut state, &delta);
        state.last_touched = now;

        if let Err(violation) = state.validate() {
            tracing::warn!(
                event_name = "flow.invoice.invalid_state",
                error = %violation,
                "reduced state violates an invariant"
            );
        }

        Reduction { state, delta, page_move, first_turn }
    }

    /// Full turn against a session store: reset, load, reduce, persist,
    /// and gate on completeness. Never calls the search backend.
    ///
    /// A turn that ends in a search persists the cursor it started from;
    /// `record_results` commits the new one once the page arrives, so a
    /// failed search can be retried with the same message.
    pub async fn reduce_turn(
        &self,
        store: &dyn SessionStore,
        conversation_id: &str,
        user_text: &str,
        seed: &ClassifierSeed,
        now: DateTime<Utc>,
    ) -> (Reduction, InvoiceStep) {
        let mut existing = store.get(conversation_id).await;
        if crate::extract::wants_reset(user_text) {
            store.delete(conversation_id).await;
            existing = None;
        }

        let committed_cursor = existing
            .as_ref()
            .map(|state| (state.skip, state.last_key.clone()))
            .unwrap_or_default();
        let reduction = self.reduce(existing, user_text, seed, now);

        let missing = reduction.missing_filters();
        let step = if missing.is_empty() {
            let mut pending = reduction.state.clone();
            (pending.skip, pending.last_key) = committed_cursor;
            store.set(conversation_id, pending).await;

            let state = reduction.state.clone();
            InvoiceStep::Search {
                legacy_filter: state.legacy_filter().render(),
                options: SearchOptions::page(state.page_size, state.skip)
                    .with_timeout(self.search_timeout),
                state,
            }
        } else {
            store.set(conversation_id, reduction.state.clone()).await;
            InvoiceStep::NeedsFilters { state: reduction.state.clone(), missing }
        };
        (reduction, step)
    }

    /// Stores the total from a completed search and returns the page window.
    pub async fn record_results(
        &self,
        store: &dyn SessionStore,
        conversation_id: &str,
        mut state: FilterState,
        returned: u64,
        total_count: Option<u64>,
    ) -> ResultWindow {
        let window = ResultWindow::new(state.skip, returned, total_count, self.refine_threshold);
        state.total_count = Some(window.total_count);
        store.set(conversation_id, state).await;
        window
    }
}

fn seed_state(state: &mut FilterState, seed: &ClassifierSeed, user_text: &str, current_year: i32) {
    apply_patches(
        state,
        &[
            FieldPatch::fill(FilterField::CompanyCode, &seed.company_code),
            FieldPatch::fill(FilterField::FiscalYear, &seed.fiscal_year),
        ],
    );
    if let Some(flag) = seed.open_item.as_deref().filter(|flag| matches!(*flag, "X" | "")) {
        state.open_item = flag.to_string();
    }

    if !state.has_date_range() && !seed.date_range.trim().is_empty() {
        let fallback_year = if state.fiscal_year.is_empty() {
            current_year.to_string()
        } else {
            state.fiscal_year.clone()
        };
        if let Some(range) = extract_date_range(&seed.date_range, &fallback_year) {
            apply_patches(
                state,
                &[
                    FieldPatch::overwrite(FilterField::DateFrom, range.date_from),
                    FieldPatch::overwrite(FilterField::DateTo, range.date_to),
                    FieldPatch::fill(FilterField::FiscalYear, range.fiscal_year),
                ],
            );
        }
    }
    if let Some((date_from, date_to)) = normalize_date_pair(&seed.date_from, &seed.date_to) {
        apply_patches(
            state,
            &[
                FieldPatch::fill(FilterField::DateFrom, date_from),
                FieldPatch::fill(FilterField::DateTo, date_to),
            ],
        );
    }
    if state.open_item.is_empty()
        && crate::extract::extract_open_item_preference(user_text)
            == Some(crate::extract::OpenItemPreference::OpenOnly)
    {
        state.open_item = "X".to_owned();
    }

    if !seed.legacy_query.trim().is_empty() {
        let legacy = LegacyFilter::parse(&seed.legacy_query);
        apply_patches(
            state,
            &[
                FieldPatch::overwrite(FilterField::AccountingDocument, digits_only(&legacy.invoice_no)),
                FieldPatch::overwrite(FilterField::FiscalYear, legacy.fiscal_year),
                FieldPatch::overwrite(FilterField::CompanyCode, legacy.company_code),
            ],
        );
        if let Some((date_from, date_to)) = normalize_date_pair(&legacy.date_from, &legacy.date_to) {
            apply_patches(
                state,
                &[
                    FieldPatch::overwrite(FilterField::DateFrom, date_from),
                    FieldPatch::overwrite(FilterField::DateTo, date_to),
                ],
            );
        }
        if legacy.open_items_only {
            state.open_item = "X".to_owned();
        }
    }

    if !state.accounting_document.is_empty() {
        let derived = derive_from_invoice_number(&state.accounting_document);
        apply_patches(
            state,
            &[
                FieldPatch::fill(FilterField::CompanyCode, derived.company_code),
                FieldPatch::fill(FilterField::FiscalYear, derived.fiscal_year),
                FieldPatch::overwrite(FilterField::AccountingDocument, derived.accounting_document),
            ],
        );
    }
}

fn merge_delta(state: &mut FilterState, delta: &ExtractedDelta) {
    let overwrite = |field: FilterField, value: &Option<String>| {
        FieldPatch::overwrite(field, value.clone().unwrap_or_default())
    };
    apply_patches(
        state,
        &[
            overwrite(FilterField::CompanyCode, &delta.company_code),
            overwrite(FilterField::FiscalYear, &delta.fiscal_year),
            overwrite(FilterField::DateFrom, &delta.date_from),
            overwrite(FilterField::DateTo, &delta.date_to),
        ],
    );
    if let Some(preference) = delta.open_item {
        state.open_item = preference.flag().to_string();
    }
}

fn paginate(state: &mut FilterState, delta: &ExtractedDelta) -> PageMove {
    let fingerprint = state.fingerprint();
    let page_move = if state.last_key != fingerprint {
        state.skip = 0;
        PageMove::Restart
    } else if delta.wants_next {
        state.skip = state.skip.saturating_add(state.page_size);
        PageMove::Next
    } else if delta.wants_previous {
        state.skip = state.skip.saturating_sub(state.page_size);
        PageMove::Previous
    } else {
        PageMove::Stay
    };
    state.last_key = fingerprint;
    page_move
}
