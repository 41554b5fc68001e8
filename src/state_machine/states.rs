text_enum! {
    /// Order lifecycle states.
    ///
    /// The happy path runs `pending_payment` through `delivered`; `exception`
    /// is a side branch that returns to a working state or ends in
    /// `cancelled`.
    pub enum OrderStatus {
        /// Order placed, payment not yet captured
        PendingPayment => "pending_payment",
        /// Payment captured, waiting for a processor
        PaymentConfirmed => "payment_confirmed",
        /// Picked up by a processor
        Processing => "processing",
        /// Tailoring / production underway
        InProduction => "in_production",
        /// Waiting on quality inspection
        QualityCheck => "quality_check",
        Packaging => "packaging",
        Shipped => "shipped",
        Delivered => "delivered",
        /// Blocked on one or more open exceptions
        Exception => "exception",
        Cancelled => "cancelled",
    }
}

impl OrderStatus {
    /// Allowed next states from this state.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            PendingPayment => &[PaymentConfirmed, Cancelled, Exception],
            PaymentConfirmed => &[Processing, Cancelled, Exception],
            Processing => &[InProduction, QualityCheck, Cancelled, Exception],
            InProduction => &[QualityCheck, Cancelled, Exception],
            QualityCheck => &[Packaging, Shipped, Cancelled, Exception],
            Packaging => &[Shipped, Cancelled, Exception],
            Shipped => &[Delivered, Exception],
            Exception => &[
                PaymentConfirmed,
                Processing,
                InProduction,
                QualityCheck,
                Packaging,
                Cancelled,
            ],
            Delivered | Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Entering this state closes the order's processing queue entry.
    pub fn completes_queue_entry(&self) -> bool {
        matches!(self, Self::Shipped | Self::Delivered | Self::Cancelled)
    }

    /// Paid orders that have not left the building hold a queue entry.
    pub fn is_queueable(&self) -> bool {
        !matches!(self, Self::PendingPayment) && !self.completes_queue_entry()
    }

    /// States where fulfillment work is actively being done.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Processing | Self::InProduction | Self::QualityCheck | Self::Packaging
        )
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        Self::PendingPayment
    }
}

text_enum! {
    /// Exception resolution states.
    pub enum ExceptionStatus {
        Open => "open",
        InProgress => "in_progress",
        Resolved => "resolved",
        Escalated => "escalated",
    }
}

impl ExceptionStatus {
    /// Exception status only moves forward; resolved is final.
    pub fn allowed_transitions(&self) -> &'static [ExceptionStatus] {
        use ExceptionStatus::*;
        match self {
            Open => &[InProgress, Resolved, Escalated],
            InProgress => &[Resolved, Escalated],
            Escalated => &[Resolved],
            Resolved => &[],
        }
    }

    pub fn can_transition_to(&self, target: ExceptionStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// Still blocking the order.
    pub fn is_unresolved(&self) -> bool {
        !matches!(self, Self::Resolved)
    }
}

impl Default for ExceptionStatus {
    fn default() -> Self {
        Self::Open
    }
}
