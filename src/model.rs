use serde::{Deserialize, Serialize};

/// Remote item lifecycle states as reported by the partner API.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ItemStatus {
    Normal,
    Banned,
    Deleted,
    Unlist,
    Unknown,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Normal => "NORMAL",
            ItemStatus::Banned => "BANNED",
            ItemStatus::Deleted => "DELETED",
            ItemStatus::Unlist => "UNLIST",
            ItemStatus::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "NORMAL" => ItemStatus::Normal,
            "BANNED" => ItemStatus::Banned,
            "DELETED" => ItemStatus::Deleted,
            "UNLIST" => ItemStatus::Unlist,
            _ => ItemStatus::Unknown,
        }
    }
}

/// Remote order lifecycle states. The partner API reports these verbatim;
/// anything it adds later falls back to `Unknown`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Unpaid,
    ReadyToShip,
    ToShip,
    Shipped,
    ToConfirmReceive,
    ToReturn,
    Completed,
    Cancelled,
    InvoicePending,
    RetryShip,
    PartialShipped,
    PartialReturned,
    Returned,
    Unknown,
}

impl OrderStatus {
    /// The statuses an "ALL" scan fans out over. The remote list endpoint
    /// does not honor a combined filter, so each is queried separately.
    pub const SCAN_SET: &'static [OrderStatus] = &[
        OrderStatus::Unpaid,
        OrderStatus::ToConfirmReceive,
        OrderStatus::ToShip,
        OrderStatus::Shipped,
        OrderStatus::ToReturn,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::InvoicePending,
        OrderStatus::RetryShip,
        OrderStatus::PartialShipped,
        OrderStatus::PartialReturned,
        OrderStatus::Returned,
        OrderStatus::ReadyToShip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Unpaid => "UNPAID",
            OrderStatus::ReadyToShip => "READY_TO_SHIP",
            OrderStatus::ToShip => "TO_SHIP",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::ToConfirmReceive => "TO_CONFIRM_RECEIVE",
            OrderStatus::ToReturn => "TO_RETURN",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::InvoicePending => "INVOICE_PENDING",
            OrderStatus::RetryShip => "RETRY_SHIP",
            OrderStatus::PartialShipped => "PARTIAL_SHIPPED",
            OrderStatus::PartialReturned => "PARTIAL_RETURNED",
            OrderStatus::Returned => "RETURNED",
            OrderStatus::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "UNPAID" => OrderStatus::Unpaid,
            "READY_TO_SHIP" => OrderStatus::ReadyToShip,
            "TO_SHIP" => OrderStatus::ToShip,
            "SHIPPED" => OrderStatus::Shipped,
            "TO_CONFIRM_RECEIVE" => OrderStatus::ToConfirmReceive,
            "TO_RETURN" => OrderStatus::ToReturn,
            "COMPLETED" => OrderStatus::Completed,
            "CANCELLED" => OrderStatus::Cancelled,
            "INVOICE_PENDING" => OrderStatus::InvoicePending,
            "RETRY_SHIP" => OrderStatus::RetryShip,
            "PARTIAL_SHIPPED" => OrderStatus::PartialShipped,
            "PARTIAL_RETURNED" => OrderStatus::PartialReturned,
            "RETURNED" => OrderStatus::Returned,
            _ => OrderStatus::Unknown,
        }
    }
}

/// Entity type a sync run covers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncType {
    Products,
    Orders,
}

impl SyncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncType::Products => "products",
            SyncType::Orders => "orders",
        }
    }
}

/// Terminal (or pending) state of a sync run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncStatus {
    Pending,
    Success,
    Partial,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Success => "success",
            SyncStatus::Partial => "partial",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SyncStatus::Pending),
            "success" => Some(SyncStatus::Success),
            "partial" => Some(SyncStatus::Partial),
            "failed" => Some(SyncStatus::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_round_trips() {
        for st in OrderStatus::SCAN_SET {
            assert_eq!(OrderStatus::parse(st.as_str()), *st);
        }
        assert_eq!(OrderStatus::parse("SOMETHING_NEW"), OrderStatus::Unknown);
    }

    #[test]
    fn item_status_falls_back_to_unknown() {
        assert_eq!(ItemStatus::parse("NORMAL"), ItemStatus::Normal);
        assert_eq!(ItemStatus::parse("weird"), ItemStatus::Unknown);
    }

    #[test]
    fn scan_set_excludes_unknown() {
        assert!(!OrderStatus::SCAN_SET.contains(&OrderStatus::Unknown));
        assert_eq!(OrderStatus::SCAN_SET.len(), 13);
    }
}
