use common::BuyerId;
use domain::{Order, OrderStatus};

/// Page size used when the caller asks for none (or for a non-positive one).
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Upper bound on the page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Whose orders a read may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderScope {
    /// Only orders placed by this buyer.
    Buyer(BuyerId),

    /// Any order; used by trusted back-office callers.
    Operator,
}

impl OrderScope {
    /// Returns true if an order placed by `buyer_id` is visible in this scope.
    pub fn permits(&self, buyer_id: BuyerId) -> bool {
        match self {
            OrderScope::Buyer(scoped) => *scoped == buyer_id,
            OrderScope::Operator => true,
        }
    }

    pub fn buyer_id(&self) -> Option<BuyerId> {
        match self {
            OrderScope::Buyer(buyer_id) => Some(*buyer_id),
            OrderScope::Operator => None,
        }
    }
}

/// Filter and pagination for listing a buyer's orders.
///
/// `page` and `page_size` are taken as given and normalized on use:
/// anything below 1 falls back to page 1 / [`DEFAULT_PAGE_SIZE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderFilter {
    pub buyer_id: BuyerId,

    /// Filter by current status.
    pub status: Option<OrderStatus>,

    /// Filter by payment method (exact match).
    pub payment_method: Option<String>,

    /// 1-based page number.
    pub page: i64,

    pub page_size: i64,
}

impl OrderFilter {
    /// Creates a filter for all of a buyer's orders, first page.
    pub fn for_buyer(buyer_id: BuyerId) -> Self {
        Self {
            buyer_id,
            status: None,
            payment_method: None,
            page: 1,
            page_size: i64::from(DEFAULT_PAGE_SIZE),
        }
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filters on the payment method. Stored methods are trimmed, so this is too.
    pub fn payment_method(mut self, payment_method: impl Into<String>) -> Self {
        self.payment_method = Some(payment_method.into().trim().to_string());
        self
    }

    pub fn page(mut self, page: i64) -> Self {
        self.page = page;
        self
    }

    pub fn page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Returns the normalized 1-based page number.
    pub fn effective_page(&self) -> u32 {
        if self.page < 1 {
            1
        } else {
            u32::try_from(self.page).unwrap_or(u32::MAX)
        }
    }

    /// Returns the normalized page size.
    pub fn effective_page_size(&self) -> u32 {
        if self.page_size < 1 {
            DEFAULT_PAGE_SIZE
        } else {
            u32::try_from(self.page_size)
                .unwrap_or(MAX_PAGE_SIZE)
                .min(MAX_PAGE_SIZE)
        }
    }

    /// Number of matching orders to skip before the requested page.
    pub fn offset(&self) -> u64 {
        u64::from(self.effective_page() - 1) * u64::from(self.effective_page_size())
    }

    /// Returns true if `order` matches every filter criterion.
    pub fn matches(&self, order: &Order) -> bool {
        if order.buyer_id() != self.buyer_id {
            return false;
        }
        if let Some(status) = self.status
            && order.status() != status
        {
            return false;
        }
        if let Some(ref payment_method) = self.payment_method
            && order.payment_method() != payment_method
        {
            return false;
        }
        true
    }
}

/// One page of orders plus the total number of matches before pagination.
#[derive(Debug, Clone)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl OrderPage {
    /// Number of pages needed to show all matches.
    pub fn page_count(&self) -> u64 {
        self.total.div_ceil(u64::from(self.page_size.max(1)))
    }
}
