//! # Status & Sender Translation
//!
//! Per-platform tables that fold marketplace vocabularies onto the canonical
//! enums.
//!
//! ```text
//! ┌──────────────┬───────────────────────────────┬───────────────┐
//! │ Platform     │ Remote code                   │ Canonical     │
//! ├──────────────┼───────────────────────────────┼───────────────┤
//! │ yandex       │ PLACING RESERVED UNPAID       │ new           │
//! │              │ PENDING                       │               │
//! │              │ PROCESSING DELIVERY PICKUP    │ processing    │
//! │              │ DELIVERED PARTIALLY_RETURNED  │ completed     │
//! │              │ CANCELLED RETURNED            │ cancelled     │
//! ├──────────────┼───────────────────────────────┼───────────────┤
//! │ uzum         │ CREATED                       │ new           │
//! │              │ PACKING PENDING_DELIVERY      │ processing    │
//! │              │ DELIVERING ACCEPTED_AT_DP     │               │
//! │              │ DELIVERED COMPLETED           │ completed     │
//! │              │ CANCELED PENDING_CANCELLATION │ cancelled     │
//! │              │ RETURNED                      │               │
//! ├──────────────┼───────────────────────────────┼───────────────┤
//! │ kaspi        │ APPROVED_BY_BANK              │ new           │
//! │              │ ACCEPTED_BY_MERCHANT          │ processing    │
//! │              │ KASPI_DELIVERY ASSEMBLE       │               │
//! │              │ COMPLETED                     │ completed     │
//! │              │ CANCELLED CANCELLING RETURNED │ cancelled     │
//! │              │ KASPI_DELIVERY_RETURN_REQ…    │               │
//! ├──────────────┼───────────────────────────────┼───────────────┤
//! │ any          │ anything else                 │ processing    │
//! └──────────────┴───────────────────────────────┴───────────────┘
//! ```
//!
//! Codes are matched case-insensitively.

use crate::types::{OrderStatus, Platform, Sender};

/// Fallback for codes missing from a platform table.
pub const UNKNOWN_STATUS_FALLBACK: OrderStatus = OrderStatus::Processing;

/// Looks a remote status code up in the platform table.
///
/// Returns `None` for codes the table does not know, so callers can log
/// them before applying the fallback.
pub fn lookup_order_status(platform: Platform, code: &str) -> Option<OrderStatus> {
    let code = code.trim().to_ascii_uppercase();
    let status = match platform {
        Platform::Yandex => match code.as_str() {
            "PLACING" | "RESERVED" | "UNPAID" | "PENDING" => OrderStatus::New,
            "PROCESSING" | "DELIVERY" | "PICKUP" => OrderStatus::Processing,
            "DELIVERED" | "PARTIALLY_RETURNED" => OrderStatus::Completed,
            "CANCELLED" | "RETURNED" => OrderStatus::Cancelled,
            _ => return None,
        },
        Platform::Uzum => match code.as_str() {
            "CREATED" => OrderStatus::New,
            "PACKING" | "PENDING_DELIVERY" | "DELIVERING" | "ACCEPTED_AT_DP" => {
                OrderStatus::Processing
            }
            "DELIVERED" | "COMPLETED" => OrderStatus::Completed,
            "CANCELED" | "PENDING_CANCELLATION" | "RETURNED" => OrderStatus::Cancelled,
            _ => return None,
        },
        Platform::Kaspi => match code.as_str() {
            "APPROVED_BY_BANK" => OrderStatus::New,
            "ACCEPTED_BY_MERCHANT" | "KASPI_DELIVERY" | "ASSEMBLE" => OrderStatus::Processing,
            "COMPLETED" => OrderStatus::Completed,
            "CANCELLED" | "CANCELLING" | "RETURNED" | "KASPI_DELIVERY_RETURN_REQUESTED" => {
                OrderStatus::Cancelled
            }
            _ => return None,
        },
    };
    Some(status)
}

/// Translates a remote status code, falling back to `processing`.
pub fn order_status(platform: Platform, code: &str) -> OrderStatus {
    lookup_order_status(platform, code).unwrap_or(UNKNOWN_STATUS_FALLBACK)
}

/// Normalizes a platform's sender-role marker.
///
/// Unknown roles become [`Sender::System`]: a message of unknown origin must
/// never be mistaken for a buyer's (no alert) or for an outbound reply.
pub fn sender_role(platform: Platform, role: &str) -> Sender {
    let role = role.trim().to_ascii_uppercase();
    match (platform, role.as_str()) {
        (Platform::Yandex, "CUSTOMER") => Sender::Client,
        (Platform::Yandex, "PARTNER") => Sender::Shop,
        (Platform::Uzum, "CUSTOMER") | (Platform::Uzum, "BUYER") => Sender::Client,
        (Platform::Uzum, "SELLER") => Sender::Shop,
        (Platform::Kaspi, "CUSTOMER") => Sender::Client,
        (Platform::Kaspi, "MERCHANT") => Sender::Shop,
        _ => Sender::System,
    }
}
