use crate::extract::normalize_date_token;
use crate::flows::reducer::ResultWindow;
use crate::flows::states::{FilterState, MissingFilter};
use crate::ports::InvoiceRecord;

use super::{format_amount, summarize_filters};

pub const INVOICE_SEARCH_UNAVAILABLE: &str =
    "Invoice search service is temporarily unavailable. Please try again in a few minutes.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FieldKind {
    Text,
    Date,
    Amount,
}

struct BlockField {
    label: &'static str,
    aliases: &'static [&'static str],
    kind: FieldKind,
}

const BLOCK_FIELDS: [BlockField; 12] = [
    BlockField {
        label: "Invoice Number",
        aliases: &["InvoiceNumber", "invoiceNumber", "AccountingDocument", "accountingDocument"],
        kind: FieldKind::Text,
    },
    BlockField {
        label: "Document Date",
        aliases: &["DocumentDate", "documentDate", "BLDAT", "bldat"],
        kind: FieldKind::Date,
    },
    BlockField {
        label: "Posting Date",
        aliases: &["PostingDate", "postingDate", "BUDAT", "budat"],
        kind: FieldKind::Date,
    },
    BlockField {
        label: "Invoice Date",
        aliases: &["InvoiceDate", "invoiceDate", "Invoice_Date"],
        kind: FieldKind::Date,
    },
    BlockField { label: "Due Date", aliases: &["DueDate", "dueDate", "NETDT", "netdt"], kind: FieldKind::Date },
    BlockField {
        label: "Customer",
        aliases: &["Customer", "customerName", "CustomerName", "customer"],
        kind: FieldKind::Text,
    },
    BlockField { label: "Currency", aliases: &["Currency", "currency", "WAERS", "waers"], kind: FieldKind::Text },
    BlockField {
        label: "Invoice Amount",
        aliases: &["InvoiceAmount", "invoiceAmount", "Amount", "amount", "WRBTR", "wrbtr"],
        kind: FieldKind::Amount,
    },
    BlockField {
        label: "Open Amount",
        aliases: &["OpenAmount", "openAmount", "Open_Amt", "openAmt"],
        kind: FieldKind::Amount,
    },
    BlockField {
        label: "Cleared Amount",
        aliases: &["ClearedAmount", "clearedAmount", "Cleared_Amt", "clearedAmt"],
        kind: FieldKind::Amount,
    },
    BlockField {
        label: "Invoice Status",
        aliases: &["InvoiceStatus", "invoiceStatus", "Status", "clearStatus"],
        kind: FieldKind::Text,
    },
    BlockField {
        label: "Reference Document",
        aliases: &["ReferenceDocument", "referenceDocument", "XBLNR", "xblnr", "Reference"],
        kind: FieldKind::Text,
    },
];

/// `Label: value` lines in fixed order, skipping empty fields.
pub fn format_invoice_block(record: &InvoiceRecord) -> String {
    BLOCK_FIELDS
        .iter()
        .filter_map(|field| {
            let raw = record.field(field.aliases)?;
            let value = match field.kind {
                FieldKind::Text => raw,
                FieldKind::Date => normalize_date_token(&raw),
                FieldKind::Amount => format_amount(&raw),
            };
            (!value.is_empty()).then(|| format!("{}: {value}", field.label))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn missing_filters_prompt(missing: &[MissingFilter], state: &FilterState) -> String {
    let bullets =
        missing.iter().map(|item| format!("- {}", item.prompt())).collect::<Vec<_>>().join("\n");
    format!(
        "I can help with that, but I need the following details:\n{bullets}\n\nCurrent context: {}.",
        summarize_filters(state)
    )
}

pub fn empty_result_message(state: &FilterState) -> String {
    format!(
        "No invoices were found for the current criteria: {}.\n\nTry a smaller date range, or provide Invoice Number / Reference Document / Customer Code.",
        summarize_filters(state)
    )
}

/// Header, numbered invoice blocks, and a footer chosen by the window.
pub fn result_page_message(
    state: &FilterState,
    items: &[InvoiceRecord],
    window: &ResultWindow,
) -> String {
    let qualifier = if state.open_items_only() { "OPEN invoices" } else { "invoices" };
    let mut header = format!("Found {} {qualifier}. Showing {}.\n", window.total_count, items.len());
    if window.needs_refine {
        header.push_str("Result set is large, please refine.\n\n");
    }

    let blocks = items
        .iter()
        .enumerate()
        .map(|(index, record)| {
            format!("{}. {}", window.skip + index as u64 + 1, format_invoice_block(record))
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let page_size = state.page_size;
    let footer = if window.needs_refine {
        let mut footer = String::from(
            "Here are some follow-up questions to help narrow down your search:\n\
             1. Can you narrow down by a smaller date range (e.g., 01–15 Jan 2024)?\n\
             2. Do you have an Invoice Number / Reference Document / Customer Code to filter?\n\
             3. Do you want OPEN items only or ALL invoices?\n",
        );
        if window.has_more {
            footer.push_str(&format!(
                "\nIf you still want to continue, reply \"next\" to see the next {page_size}.\n"
            ));
        }
        footer
    } else if window.has_more {
        format!("Would you like to see the next {page_size} invoices? (Reply: \"next\")\n")
    } else {
        "End of results for the current criteria.\n".to_owned()
    };

    format!("{header}{blocks}\n\n{footer}").trim().to_string()
}
