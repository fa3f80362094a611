//! Token booking lifecycle: a buyer reserves a listing with a partial payment,
//! the seller advances the booking, either side may cancel, and unpaid holds
//! lapse once their validity window closes.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{error, info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::lifecycle::TransitionPolicy;
use crate::models::{CreateTokenBookingRequest, PropertyStatus, StatusPatch, TokenBooking};
use crate::store::BookingStore;
use crate::uploads::{public_url, StoredFile};

pub struct TokenBookingService {
    store: Arc<dyn BookingStore>,
    policy: TransitionPolicy,
    validity: Duration,
    public_base_url: String,
}

impl TokenBookingService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        policy: TransitionPolicy,
        validity: Duration,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            policy,
            validity,
            public_base_url: public_base_url.into(),
        }
    }

    pub async fn create(
        &self,
        requester_id: &str,
        request: CreateTokenBookingRequest,
    ) -> Result<TokenBooking, ApiError> {
        let draft = request.validate()?;

        let property = self
            .store
            .find_property(draft.property_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Property not found".into()))?;

        if property.owner_id == requester_id {
            warn!("User {} tried to book own property {}", requester_id, property.id);
            return Err(ApiError::InvalidOperation(
                "You cannot book your own property".into(),
            ));
        }
        if property.status != PropertyStatus::Available {
            return Err(ApiError::Unavailable(
                "Property is not available for booking".into(),
            ));
        }

        let booking = TokenBooking::pending(requester_id, &property, draft, Utc::now(), self.validity);
        match self.store.insert_reservation_claiming(booking).await? {
            Some(booking) => {
                info!(
                    "Token booking {} created on property {} by {}",
                    booking.id, booking.property_id, requester_id
                );
                Ok(booking)
            }
            None => {
                warn!("Property {} was claimed by a concurrent booking", property.id);
                Err(ApiError::Unavailable(
                    "Property is not available for booking".into(),
                ))
            }
        }
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<TokenBooking>, ApiError> {
        Ok(self.store.list_reservations_for_user(user_id).await?)
    }

    pub async fn get(&self, requester_id: &str, id: Uuid) -> Result<TokenBooking, ApiError> {
        let booking = self.load(id).await?;
        if !booking.is_participant(requester_id) {
            return Err(ApiError::Forbidden(
                "Not authorized to view this booking".into(),
            ));
        }
        Ok(booking)
    }

    /// Seller-only. Leaves the property untouched, even when the new status is
    /// `cancelled`.
    pub async fn update_status(
        &self,
        requester_id: &str,
        id: Uuid,
        patch: StatusPatch,
    ) -> Result<TokenBooking, ApiError> {
        if patch.is_empty() {
            return Err(ApiError::Validation(
                "Provide at least one of status, paymentStatus, agreementStatus".into(),
            ));
        }

        let mut booking = self.load(id).await?;
        if booking.seller_id != requester_id {
            warn!("User {} is not the seller of booking {}", requester_id, id);
            return Err(ApiError::Forbidden(
                "Only the seller can update this booking".into(),
            ));
        }

        if let Some(next) = patch.status {
            self.policy.check("status", booking.status, next)?;
            booking.status = next;
        }
        if let Some(next) = patch.payment_status {
            self.policy.check("paymentStatus", booking.payment_status, next)?;
            booking.payment_status = next;
        }
        if let Some(next) = patch.agreement_status {
            self.policy.check("agreementStatus", booking.agreement_status, next)?;
            booking.agreement_status = next;
        }
        booking.updated_at = Utc::now();

        self.store.update_reservation(&booking).await?;
        info!(
            "Token booking {} updated: status={} payment={} agreement={}",
            booking.id, booking.status, booking.payment_status, booking.agreement_status
        );
        Ok(booking)
    }

    /// Buyer or seller. Marks the booking cancelled and, when it still held the
    /// property, puts the property back on the market.
    pub async fn cancel(
        &self,
        requester_id: &str,
        id: Uuid,
        reason: Option<String>,
    ) -> Result<TokenBooking, ApiError> {
        let booking = self.load(id).await?;
        if !booking.is_participant(requester_id) {
            return Err(ApiError::Forbidden(
                "Not authorized to cancel this booking".into(),
            ));
        }
        let strict = self.policy == TransitionPolicy::Strict;
        if strict && !booking.status.is_active() {
            return Err(not_cancellable(&booking));
        }

        let reason = reason.filter(|r| !r.trim().is_empty());
        let outcome = self
            .store
            .cancel_reservation(id, reason, Utc::now(), strict)
            .await?
            .ok_or_else(|| ApiError::NotFound("Token booking not found".into()))?;

        if outcome.released {
            info!(
                "Token booking {} cancelled by {}; property {} released",
                id, requester_id, outcome.booking.property_id
            );
        } else if strict {
            warn!("Token booking {} stopped being active before it was cancelled", id);
            return Err(not_cancellable(&outcome.booking));
        } else {
            info!(
                "Token booking {} cancelled again by {}; property {} left as is",
                id, requester_id, outcome.booking.property_id
            );
        }
        Ok(outcome.booking)
    }

    /// Buyer-only. Records where the proof lives; the payment status is left for
    /// the seller to confirm.
    pub async fn attach_payment_proof(
        &self,
        requester_id: &str,
        id: Uuid,
        file: &StoredFile,
    ) -> Result<TokenBooking, ApiError> {
        let mut booking = self.load(id).await?;
        if booking.buyer_id != requester_id {
            return Err(ApiError::Forbidden(
                "Only the buyer can upload payment proof".into(),
            ));
        }

        booking.payment_proof = Some(public_url(&self.public_base_url, &file.path));
        booking.updated_at = Utc::now();
        self.store.update_reservation(&booking).await?;
        info!("Payment proof attached to token booking {}", booking.id);
        Ok(booking)
    }

    /// Seller-only. Stores the agreement document without deciding the
    /// agreement status.
    pub async fn attach_agreement_document(
        &self,
        requester_id: &str,
        id: Uuid,
        file: &StoredFile,
    ) -> Result<TokenBooking, ApiError> {
        let mut booking = self.load(id).await?;
        if booking.seller_id != requester_id {
            return Err(ApiError::Forbidden(
                "Only the seller can upload the agreement".into(),
            ));
        }

        booking.agreement_document = Some(public_url(&self.public_base_url, &file.path));
        booking.updated_at = Utc::now();
        self.store.update_reservation(&booking).await?;
        info!("Agreement document attached to token booking {}", booking.id);
        Ok(booking)
    }

    /// Cancels every pending booking whose validity window closed before `now`
    /// and releases its property. A booking the seller moved on since the
    /// listing is left alone. Returns how many were expired.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<usize, ApiError> {
        let stale = self.store.list_expired_pending(now).await?;
        let mut expired = 0;
        for booking in stale {
            match self.store.expire_if_still_pending(booking.id, now).await {
                Ok(true) => {
                    info!(
                        "Token booking {} expired; property {} released",
                        booking.id, booking.property_id
                    );
                    expired += 1;
                }
                Ok(false) => info!("Token booking {} changed before expiry; skipped", booking.id),
                Err(e) => error!("Failed to expire token booking {}: {}", booking.id, e),
            }
        }
        Ok(expired)
    }

    async fn load(&self, id: Uuid) -> Result<TokenBooking, ApiError> {
        self.store
            .find_reservation(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Token booking not found".into()))
    }
}

fn not_cancellable(booking: &TokenBooking) -> ApiError {
    ApiError::InvalidOperation(format!("A {} booking cannot be cancelled", booking.status))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::StoreError;
    use crate::models::{
        AgreementStatus, BookingType, PaymentStatus, Property, PropertyChangeset,
        ReservationStatus, EXPIRED_REASON,
    };
    use crate::store::{Cancellation, MemoryStore};

    const SELLER: &str = "seller-1";
    const BUYER: &str = "buyer-1";

    struct Fixture {
        store: Arc<MemoryStore>,
        service: TokenBookingService,
    }

    fn fixture_with(policy: TransitionPolicy) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let service = TokenBookingService::new(
            store.clone(),
            policy,
            Duration::days(7),
            "http://localhost:8080",
        );
        Fixture { store, service }
    }

    fn fixture() -> Fixture {
        fixture_with(TransitionPolicy::Permissive)
    }

    async fn listed(f: &Fixture, status: PropertyStatus) -> Property {
        f.store
            .insert_property(Property::new(SELLER, "Sea view".into(), 1_000_000.0, status))
            .await
            .unwrap()
    }

    fn sale(property_id: Uuid) -> CreateTokenBookingRequest {
        CreateTokenBookingRequest {
            property_id: Some(property_id.to_string()),
            token_amount: Some(100_000.0),
            booking_type: Some("sale".into()),
            duration: None,
            payment_method: Some("online".into()),
            notes: None,
        }
    }

    fn proof() -> StoredFile {
        StoredFile {
            path: "uploads\\payment-proofs\\p.png".into(),
            filename: "p.png".into(),
            mimetype: "image/png".into(),
        }
    }

    async fn property_status(f: &Fixture, id: Uuid) -> PropertyStatus {
        f.store.find_property(id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn create_snapshots_price_and_claims_property() {
        let f = fixture();
        let property = listed(&f, PropertyStatus::Available).await;
        let before = Utc::now();

        let booking = f.service.create(BUYER, sale(property.id)).await.unwrap();

        assert_eq!(booking.status, ReservationStatus::Pending);
        assert_eq!(booking.payment_status, PaymentStatus::Pending);
        assert_eq!(booking.agreement_status, AgreementStatus::Pending);
        assert_eq!(booking.total_property_value, 1_000_000.0);
        assert_eq!(booking.seller_id, SELLER);
        assert_eq!(booking.buyer_id, BUYER);
        assert_eq!(booking.booking_type, BookingType::Sale);
        let window = booking.valid_until - before;
        assert!(window >= Duration::days(7) && window < Duration::days(7) + Duration::seconds(5));
        assert_eq!(property_status(&f, property.id).await, PropertyStatus::TokenBooked);
    }

    #[tokio::test]
    async fn price_edits_do_not_reach_existing_bookings() {
        let f = fixture();
        let property = listed(&f, PropertyStatus::Available).await;
        let booking = f.service.create(BUYER, sale(property.id)).await.unwrap();

        let changes = PropertyChangeset {
            price: Some(2_000_000.0),
            ..Default::default()
        };
        f.store
            .update_property_fields(property.id, changes, None)
            .await
            .unwrap();

        let reloaded = f.service.get(BUYER, booking.id).await.unwrap();
        assert_eq!(reloaded.total_property_value, 1_000_000.0);
    }

    #[tokio::test]
    async fn price_edit_read_before_a_booking_keeps_the_hold() {
        let f = fixture();
        let property = listed(&f, PropertyStatus::Available).await;
        let seen_by_owner = f.store.find_property(property.id).await.unwrap().unwrap();
        assert_eq!(seen_by_owner.status, PropertyStatus::Available);

        f.service.create(BUYER, sale(property.id)).await.unwrap();
        let changes = PropertyChangeset {
            price: Some(seen_by_owner.price + 50_000.0),
            ..Default::default()
        };
        f.store
            .update_property_fields(property.id, changes, None)
            .await
            .unwrap();

        assert_eq!(property_status(&f, property.id).await, PropertyStatus::TokenBooked);
        let err = f.service.create("buyer-2", sale(property.id)).await.unwrap_err();
        assert!(matches!(err, ApiError::Unavailable(_)));
    }

    #[tokio::test]
    async fn unavailable_properties_cannot_be_booked() {
        let f = fixture();
        for status in [PropertyStatus::TokenBooked, PropertyStatus::Sold, PropertyStatus::Rented] {
            let property = listed(&f, status).await;
            let err = f.service.create(BUYER, sale(property.id)).await.unwrap_err();
            assert!(matches!(err, ApiError::Unavailable(_)), "{status}");
        }
    }

    #[tokio::test]
    async fn second_booking_on_same_property_is_unavailable() {
        let f = fixture();
        let property = listed(&f, PropertyStatus::Available).await;
        f.service.create(BUYER, sale(property.id)).await.unwrap();
        let err = f.service.create("buyer-2", sale(property.id)).await.unwrap_err();
        assert!(matches!(err, ApiError::Unavailable(_)));
    }

    #[tokio::test]
    async fn concurrent_creators_cannot_both_win() {
        let f = fixture();
        let property = listed(&f, PropertyStatus::Available).await;

        let (a, b) = tokio::join!(
            f.service.create("buyer-a", sale(property.id)),
            f.service.create("buyer-b", sale(property.id)),
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        let pending: Vec<_> = [
            f.service.list_for_user("buyer-a").await.unwrap(),
            f.service.list_for_user("buyer-b").await.unwrap(),
        ]
        .concat();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn owner_cannot_book_own_listing() {
        let f = fixture();
        let property = listed(&f, PropertyStatus::Available).await;
        let err = f.service.create(SELLER, sale(property.id)).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidOperation(_)));

        let mut rent = sale(property.id);
        rent.booking_type = Some("rent".into());
        rent.duration = Some(12);
        let err = f.service.create(SELLER, rent).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn missing_property_is_not_found() {
        let f = fixture();
        let err = f.service.create(BUYER, sale(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn rent_without_duration_is_rejected_before_lookup() {
        let f = fixture();
        let mut req = sale(Uuid::new_v4());
        req.booking_type = Some("rent".into());
        let err = f.service.create(BUYER, req).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn list_returns_both_sides_newest_first() {
        let f = fixture();
        let first = listed(&f, PropertyStatus::Available).await;
        let second = listed(&f, PropertyStatus::Available).await;
        let older = f.service.create(BUYER, sale(first.id)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let newer = f.service.create(BUYER, sale(second.id)).await.unwrap();

        let buyer_view = f.service.list_for_user(BUYER).await.unwrap();
        assert_eq!(
            buyer_view.iter().map(|b| b.id).collect::<Vec<_>>(),
            vec![newer.id, older.id]
        );
        assert_eq!(f.service.list_for_user(SELLER).await.unwrap().len(), 2);
        assert!(f.service.list_for_user("stranger").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn strangers_cannot_view_bookings() {
        let f = fixture();
        let property = listed(&f, PropertyStatus::Available).await;
        let booking = f.service.create(BUYER, sale(property.id)).await.unwrap();

        assert!(f.service.get(SELLER, booking.id).await.is_ok());
        let err = f.service.get("stranger", booking.id).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
        let err = f.service.get(BUYER, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn seller_updates_fields_without_touching_property() {
        let f = fixture();
        let property = listed(&f, PropertyStatus::Available).await;
        let booking = f.service.create(BUYER, sale(property.id)).await.unwrap();

        let updated = f
            .service
            .update_status(
                SELLER,
                booking.id,
                StatusPatch {
                    status: Some(ReservationStatus::Confirmed),
                    payment_status: Some(PaymentStatus::Completed),
                    agreement_status: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.status, ReservationStatus::Confirmed);
        assert_eq!(updated.payment_status, PaymentStatus::Completed);
        assert_eq!(updated.agreement_status, AgreementStatus::Pending);
        assert_eq!(updated.valid_until, booking.valid_until);
        assert_eq!(property_status(&f, property.id).await, PropertyStatus::TokenBooked);
    }

    #[tokio::test]
    async fn only_seller_may_update_status() {
        let f = fixture();
        let property = listed(&f, PropertyStatus::Available).await;
        let booking = f.service.create(BUYER, sale(property.id)).await.unwrap();
        let patch = StatusPatch {
            status: Some(ReservationStatus::Confirmed),
            ..StatusPatch::default()
        };

        for who in [BUYER, "stranger"] {
            let err = f.service.update_status(who, booking.id, patch.clone()).await.unwrap_err();
            assert!(matches!(err, ApiError::Forbidden(_)));
        }
        let err = f
            .service
            .update_status(SELLER, booking.id, StatusPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn permissive_policy_allows_reviving_cancelled_booking() {
        let f = fixture();
        let property = listed(&f, PropertyStatus::Available).await;
        let booking = f.service.create(BUYER, sale(property.id)).await.unwrap();
        f.service.cancel(BUYER, booking.id, None).await.unwrap();

        let revived = f
            .service
            .update_status(
                SELLER,
                booking.id,
                StatusPatch { status: Some(ReservationStatus::Confirmed), ..Default::default() },
            )
            .await
            .unwrap();
        assert_eq!(revived.status, ReservationStatus::Confirmed);
    }

    #[tokio::test]
    async fn strict_policy_rejects_illegal_transitions() {
        let f = fixture_with(TransitionPolicy::Strict);
        let property = listed(&f, PropertyStatus::Available).await;
        let booking = f.service.create(BUYER, sale(property.id)).await.unwrap();

        let err = f
            .service
            .update_status(
                SELLER,
                booking.id,
                StatusPatch { status: Some(ReservationStatus::Completed), ..Default::default() },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidOperation(_)));
        let unchanged = f.service.get(SELLER, booking.id).await.unwrap();
        assert_eq!(unchanged.status, ReservationStatus::Pending);

        f.service.cancel(BUYER, booking.id, None).await.unwrap();
        let err = f.service.cancel(BUYER, booking.id, None).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn cancellation_restores_availability() {
        let f = fixture();
        let property = listed(&f, PropertyStatus::Available).await;
        let booking = f.service.create(BUYER, sale(property.id)).await.unwrap();

        let cancelled = f
            .service
            .cancel(BUYER, booking.id, Some("changed mind".into()))
            .await
            .unwrap();

        assert_eq!(cancelled.status, ReservationStatus::Cancelled);
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("changed mind"));
        assert_eq!(property_status(&f, property.id).await, PropertyStatus::Available);
        assert!(f.service.create("buyer-2", sale(property.id)).await.is_ok());
    }

    #[tokio::test]
    async fn recancelling_does_not_release_a_newer_hold() {
        let f = fixture();
        let property = listed(&f, PropertyStatus::Available).await;
        let first = f.service.create(BUYER, sale(property.id)).await.unwrap();
        f.service.cancel(BUYER, first.id, None).await.unwrap();
        f.service.create("buyer-2", sale(property.id)).await.unwrap();

        let again = f
            .service
            .cancel(BUYER, first.id, Some("again".into()))
            .await
            .unwrap();

        assert_eq!(again.status, ReservationStatus::Cancelled);
        assert_eq!(again.cancellation_reason.as_deref(), Some("again"));
        assert_eq!(property_status(&f, property.id).await, PropertyStatus::TokenBooked);
        let err = f.service.create("buyer-3", sale(property.id)).await.unwrap_err();
        assert!(matches!(err, ApiError::Unavailable(_)));
    }

    #[tokio::test]
    async fn seller_may_cancel_but_strangers_may_not() {
        let f = fixture();
        let property = listed(&f, PropertyStatus::Available).await;
        let booking = f.service.create(BUYER, sale(property.id)).await.unwrap();

        let err = f.service.cancel("stranger", booking.id, None).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
        assert!(f.service.cancel(SELLER, booking.id, None).await.is_ok());
        let err = f.service.cancel(SELLER, Uuid::new_v4(), None).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn payment_proof_leaves_payment_status_alone() {
        let f = fixture();
        let property = listed(&f, PropertyStatus::Available).await;
        let booking = f.service.create(BUYER, sale(property.id)).await.unwrap();

        let updated = f
            .service
            .attach_payment_proof(BUYER, booking.id, &proof())
            .await
            .unwrap();
        assert_eq!(
            updated.payment_proof.as_deref(),
            Some("http://localhost:8080/uploads/payment-proofs/p.png")
        );
        assert_eq!(updated.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn only_buyer_may_attach_payment_proof() {
        let f = fixture();
        let property = listed(&f, PropertyStatus::Available).await;
        let booking = f.service.create(BUYER, sale(property.id)).await.unwrap();

        for who in [SELLER, "stranger"] {
            let err = f
                .service
                .attach_payment_proof(who, booking.id, &proof())
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::Forbidden(_)));
        }
        let err = f
            .service
            .attach_payment_proof(BUYER, Uuid::new_v4(), &proof())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn only_seller_may_attach_agreement() {
        let f = fixture();
        let property = listed(&f, PropertyStatus::Available).await;
        let booking = f.service.create(BUYER, sale(property.id)).await.unwrap();

        let err = f
            .service
            .attach_agreement_document(BUYER, booking.id, &proof())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let updated = f
            .service
            .attach_agreement_document(SELLER, booking.id, &proof())
            .await
            .unwrap();
        assert!(updated.agreement_document.is_some());
        assert_eq!(updated.agreement_status, AgreementStatus::Pending);
    }

    #[tokio::test]
    async fn sweep_expires_only_lapsed_pending_bookings() {
        let f = fixture();
        let lapsed_property = listed(&f, PropertyStatus::Available).await;
        let confirmed_property = listed(&f, PropertyStatus::Available).await;
        let lapsed = f.service.create(BUYER, sale(lapsed_property.id)).await.unwrap();
        let confirmed = f.service.create(BUYER, sale(confirmed_property.id)).await.unwrap();
        f.service
            .update_status(
                SELLER,
                confirmed.id,
                StatusPatch { status: Some(ReservationStatus::Confirmed), ..Default::default() },
            )
            .await
            .unwrap();

        assert_eq!(f.service.expire_stale(Utc::now()).await.unwrap(), 0);

        let later = Utc::now() + Duration::days(8);
        assert_eq!(f.service.expire_stale(later).await.unwrap(), 1);

        let lapsed = f.service.get(BUYER, lapsed.id).await.unwrap();
        assert_eq!(lapsed.status, ReservationStatus::Cancelled);
        assert_eq!(lapsed.cancellation_reason.as_deref(), Some(EXPIRED_REASON));
        assert_eq!(property_status(&f, lapsed_property.id).await, PropertyStatus::Available);
        assert_eq!(
            property_status(&f, confirmed_property.id).await,
            PropertyStatus::TokenBooked
        );
        assert_eq!(f.service.expire_stale(later).await.unwrap(), 0);
    }

    /// Lets the seller confirm and mark paid every booking the sweep has just
    /// listed, before the sweep writes anything.
    struct SellerActsDuringSweep {
        inner: Arc<MemoryStore>,
    }

    #[async_trait]
    impl BookingStore for SellerActsDuringSweep {
        async fn insert_property(&self, property: Property) -> Result<Property, StoreError> {
            self.inner.insert_property(property).await
        }

        async fn find_property(&self, id: Uuid) -> Result<Option<Property>, StoreError> {
            self.inner.find_property(id).await
        }

        async fn update_property_fields(
            &self,
            id: Uuid,
            changes: PropertyChangeset,
            expected_status: Option<PropertyStatus>,
        ) -> Result<Option<Property>, StoreError> {
            self.inner.update_property_fields(id, changes, expected_status).await
        }

        async fn insert_reservation_claiming(
            &self,
            booking: TokenBooking,
        ) -> Result<Option<TokenBooking>, StoreError> {
            self.inner.insert_reservation_claiming(booking).await
        }

        async fn find_reservation(&self, id: Uuid) -> Result<Option<TokenBooking>, StoreError> {
            self.inner.find_reservation(id).await
        }

        async fn list_reservations_for_user(
            &self,
            user_id: &str,
        ) -> Result<Vec<TokenBooking>, StoreError> {
            self.inner.list_reservations_for_user(user_id).await
        }

        async fn update_reservation(&self, booking: &TokenBooking) -> Result<(), StoreError> {
            self.inner.update_reservation(booking).await
        }

        async fn cancel_reservation(
            &self,
            id: Uuid,
            reason: Option<String>,
            now: DateTime<Utc>,
            require_active: bool,
        ) -> Result<Option<Cancellation>, StoreError> {
            self.inner.cancel_reservation(id, reason, now, require_active).await
        }

        async fn list_expired_pending(
            &self,
            now: DateTime<Utc>,
        ) -> Result<Vec<TokenBooking>, StoreError> {
            let listed = self.inner.list_expired_pending(now).await?;
            for booking in &listed {
                let mut confirmed = booking.clone();
                confirmed.status = ReservationStatus::Confirmed;
                confirmed.payment_status = PaymentStatus::Completed;
                self.inner.update_reservation(&confirmed).await?;
            }
            Ok(listed)
        }

        async fn expire_if_still_pending(
            &self,
            id: Uuid,
            now: DateTime<Utc>,
        ) -> Result<bool, StoreError> {
            self.inner.expire_if_still_pending(id, now).await
        }
    }

    #[tokio::test]
    async fn sweep_leaves_bookings_the_seller_confirmed_meanwhile() {
        let inner = Arc::new(MemoryStore::new());
        let service = TokenBookingService::new(
            Arc::new(SellerActsDuringSweep { inner: inner.clone() }),
            TransitionPolicy::Permissive,
            Duration::days(7),
            "http://localhost:8080",
        );
        let property = inner
            .insert_property(Property::new(SELLER, "Harbour".into(), 750_000.0, PropertyStatus::Available))
            .await
            .unwrap();
        let booking = service.create(BUYER, sale(property.id)).await.unwrap();

        let expired = service.expire_stale(Utc::now() + Duration::days(8)).await.unwrap();

        assert_eq!(expired, 0);
        let stored = service.get(BUYER, booking.id).await.unwrap();
        assert_eq!(stored.status, ReservationStatus::Confirmed);
        assert_eq!(stored.payment_status, PaymentStatus::Completed);
        assert_eq!(stored.cancellation_reason, None);
        let property = inner.find_property(property.id).await.unwrap().unwrap();
        assert_eq!(property.status, PropertyStatus::TokenBooked);
    }
}
