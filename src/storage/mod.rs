//! In-memory persistence.
//!
//! Uniqueness indexes back the write rules: one delivery per
//! (subscription, date), one route per (agent, date) and one stop per
//! delivery or order. A route owns its stops and is inserted with a single
//! map insert, so readers see either the whole route or nothing.

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use crate::engine::scheduler::ExpansionReport;
use crate::error::AppError;
use crate::models::address::Address;
use crate::models::delivery::{DeliveryRequest, SubscriptionDelivery};
use crate::models::order::Order;
use crate::models::route::{Route, RouteStop, StopTarget};
use crate::models::status::{DeliveryStatus, apply_transition};
use crate::models::subscription::{Subscription, SubscriptionStatus};

#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(SubscriptionDelivery),
    Duplicate(Uuid),
}

/// A delivery or order after a status change, with its route stop when it
/// is on a route.
#[derive(Debug, Clone)]
pub struct StatusChange<T> {
    pub record: T,
    pub stop: Option<(Route, RouteStop)>,
}

#[derive(Default)]
pub struct Storage {
    pub addresses: DashMap<Uuid, Address>,
    pub subscriptions: DashMap<Uuid, Subscription>,
    pub deliveries: DashMap<Uuid, SubscriptionDelivery>,
    pub orders: DashMap<Uuid, Order>,
    pub routes: DashMap<Uuid, Route>,
    pub expansion_runs: DashMap<NaiveDate, ExpansionReport>,
    delivery_index: DashMap<(Uuid, NaiveDate), Uuid>,
    route_index: DashMap<(Uuid, NaiveDate), Uuid>,
    stop_index: DashMap<Uuid, Uuid>,
    target_index: DashMap<StopTarget, Uuid>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(&self, id: Uuid) -> Option<Address> {
        self.addresses.get(&id).map(|entry| entry.value().clone())
    }

    pub fn active_subscriptions(&self) -> Vec<Subscription> {
        let mut active: Vec<Subscription> = self
            .subscriptions
            .iter()
            .filter(|entry| entry.status == SubscriptionStatus::Active)
            .map(|entry| entry.value().clone())
            .collect();
        active.sort_by_key(|subscription| (subscription.created_at, subscription.id));
        active
    }

    pub fn set_subscription_status(
        &self,
        id: Uuid,
        status: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> Result<Subscription, AppError> {
        let mut subscription = self
            .subscriptions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("subscription {id} not found")))?;

        if subscription.status == SubscriptionStatus::Cancelled && status != subscription.status {
            return Err(AppError::Conflict(format!("subscription {id} is cancelled")));
        }

        subscription.status = status;
        subscription.updated_at = now;
        Ok(subscription.clone())
    }

    /// Creates the delivery unless one already exists for the same
    /// subscription and date.
    pub fn create_delivery(
        &self,
        request: &DeliveryRequest,
        now: DateTime<Utc>,
    ) -> Result<CreateOutcome, AppError> {
        let address_id = self
            .subscriptions
            .get(&request.subscription_id)
            .map(|subscription| subscription.address_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("subscription {} not found", request.subscription_id))
            })?;

        match self
            .delivery_index
            .entry((request.subscription_id, request.scheduled_date))
        {
            Entry::Occupied(existing) => Ok(CreateOutcome::Duplicate(*existing.get())),
            Entry::Vacant(slot) => {
                let delivery = SubscriptionDelivery {
                    id: Uuid::new_v4(),
                    subscription_id: request.subscription_id,
                    address_id,
                    scheduled_date: request.scheduled_date,
                    scheduled_for: request.scheduled_for,
                    status: request.status,
                    delivered_at: None,
                    agent_id: None,
                    created_at: now,
                };
                self.deliveries.insert(delivery.id, delivery.clone());
                slot.insert(delivery.id);
                Ok(CreateOutcome::Created(delivery))
            }
        }
    }

    /// Deliveries for `date` ordered by dispatch time, then by when their
    /// subscription was created. Expansion creates them in that same order.
    pub fn deliveries_for_date(&self, date: NaiveDate) -> Vec<SubscriptionDelivery> {
        let mut deliveries: Vec<SubscriptionDelivery> = self
            .deliveries
            .iter()
            .filter(|entry| entry.scheduled_date == date)
            .map(|entry| entry.value().clone())
            .collect();

        deliveries.sort_by_cached_key(|delivery| {
            let subscribed_at = self
                .subscriptions
                .get(&delivery.subscription_id)
                .map(|subscription| subscription.created_at);
            (delivery.scheduled_for, subscribed_at, delivery.subscription_id)
        });
        deliveries
    }

    pub fn orders_for_date(&self, date: NaiveDate) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.scheduled_date == date)
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by_key(|order| (order.created_at, order.id));
        orders
    }

    /// Id of the stop serving `target`, if it is already on a route.
    pub fn stop_for(&self, target: StopTarget) -> Option<Uuid> {
        self.target_index.get(&target).map(|entry| *entry)
    }

    fn ensure_unrouted(&self, target: StopTarget) -> Result<(), AppError> {
        match self.stop_for(target) {
            Some(stop_id) => Err(AppError::Conflict(format!(
                "{target:?} is already on a route as stop {stop_id}"
            ))),
            None => Ok(()),
        }
    }

    pub fn assign_delivery_agent(
        &self,
        id: Uuid,
        agent_id: Uuid,
    ) -> Result<SubscriptionDelivery, AppError> {
        self.ensure_unrouted(StopTarget::Delivery(id))?;

        let mut delivery = self
            .deliveries
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))?;

        if delivery.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "delivery {id} is already {}",
                delivery.status.as_str()
            )));
        }

        delivery.agent_id = Some(agent_id);
        Ok(delivery.clone())
    }

    pub fn assign_order_agent(&self, id: Uuid, agent_id: Uuid) -> Result<Order, AppError> {
        self.ensure_unrouted(StopTarget::Order(id))?;

        let mut order = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

        if order.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "order {id} is already {}",
                order.status.as_str()
            )));
        }

        order.agent_id = Some(agent_id);
        Ok(order.clone())
    }

    /// Changes a delivery's status. A routed delivery goes through its stop
    /// so the stop and the route rollup stay in step.
    pub fn update_delivery_status(
        &self,
        id: Uuid,
        status: DeliveryStatus,
        now: DateTime<Utc>,
    ) -> Result<StatusChange<SubscriptionDelivery>, AppError> {
        let Some(stop_id) = self.stop_for(StopTarget::Delivery(id)) else {
            let record = self.apply_delivery_status(id, status, now)?;
            return Ok(StatusChange { record, stop: None });
        };

        let stop = self.update_stop_status(stop_id, status, None, now)?;
        let record = self
            .deliveries
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))?;

        Ok(StatusChange {
            record,
            stop: Some(stop),
        })
    }

    /// Order counterpart of [`Storage::update_delivery_status`].
    pub fn update_order_status(
        &self,
        id: Uuid,
        status: DeliveryStatus,
        now: DateTime<Utc>,
    ) -> Result<StatusChange<Order>, AppError> {
        let Some(stop_id) = self.stop_for(StopTarget::Order(id)) else {
            let record = self.apply_order_status(id, status, now)?;
            return Ok(StatusChange { record, stop: None });
        };

        let stop = self.update_stop_status(stop_id, status, None, now)?;
        let record = self
            .orders
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

        Ok(StatusChange {
            record,
            stop: Some(stop),
        })
    }

    fn apply_delivery_status(
        &self,
        id: Uuid,
        status: DeliveryStatus,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionDelivery, AppError> {
        let mut delivery = self
            .deliveries
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))?;

        let delivery = &mut *delivery;
        apply_transition(&mut delivery.status, &mut delivery.delivered_at, status, now)?;
        Ok(delivery.clone())
    }

    fn apply_order_status(
        &self,
        id: Uuid,
        status: DeliveryStatus,
        now: DateTime<Utc>,
    ) -> Result<Order, AppError> {
        let mut order = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

        let order = &mut *order;
        apply_transition(&mut order.status, &mut order.delivered_at, status, now)?;
        Ok(order.clone())
    }

    /// Stores a route together with all of its stops. Fails without side
    /// effects when the agent already has a route for the date, a target is
    /// already on some route, or the stop sequence is not exactly 1..=N.
    pub fn create_route(&self, route: Route) -> Result<Route, AppError> {
        for (index, stop) in route.stops.iter().enumerate() {
            if stop.sequence as usize != index + 1 || stop.route_id != route.id {
                return Err(AppError::Internal(format!(
                    "route {} has a malformed stop sequence at position {}",
                    route.id,
                    index + 1
                )));
            }
        }

        match self.route_index.entry((route.agent_id, route.date)) {
            Entry::Occupied(existing) => Err(AppError::Conflict(format!(
                "agent {} already has route {} for {}",
                route.agent_id,
                existing.get(),
                route.date
            ))),
            Entry::Vacant(slot) => {
                self.claim_targets(&route.stops)?;
                self.routes.insert(route.id, route.clone());
                for stop in &route.stops {
                    self.stop_index.insert(stop.id, route.id);
                }
                slot.insert(route.id);
                Ok(route)
            }
        }
    }

    /// Reserves every stop's target, releasing the ones already taken when
    /// any of them is routed elsewhere.
    fn claim_targets(&self, stops: &[RouteStop]) -> Result<(), AppError> {
        let mut claimed = Vec::with_capacity(stops.len());

        for stop in stops {
            let taken_by = match self.target_index.entry(stop.target) {
                Entry::Occupied(existing) => Some(*existing.get()),
                Entry::Vacant(free) => {
                    free.insert(stop.id);
                    None
                }
            };

            if let Some(stop_id) = taken_by {
                for target in &claimed {
                    self.target_index.remove(target);
                }
                return Err(AppError::Conflict(format!(
                    "{:?} is already on a route as stop {stop_id}",
                    stop.target
                )));
            }
            claimed.push(stop.target);
        }

        Ok(())
    }

    pub fn route_for_agent(&self, agent_id: Uuid, date: NaiveDate) -> Option<Route> {
        let route_id = self.route_index.get(&(agent_id, date)).map(|entry| *entry)?;
        self.routes.get(&route_id).map(|entry| entry.value().clone())
    }

    /// Moves a stop to `status` and mirrors the change onto the delivery or
    /// order it serves. The target is updated first so a rejected transition
    /// leaves both untouched.
    pub fn update_stop_status(
        &self,
        stop_id: Uuid,
        status: DeliveryStatus,
        actual_minutes: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<(Route, RouteStop), AppError> {
        let route_id = self
            .stop_index
            .get(&stop_id)
            .map(|entry| *entry)
            .ok_or_else(|| AppError::NotFound(format!("route stop {stop_id} not found")))?;

        let (target, current) = {
            let route = self
                .routes
                .get(&route_id)
                .ok_or_else(|| AppError::Internal(format!("route {route_id} missing")))?;
            let stop = route
                .stops
                .iter()
                .find(|stop| stop.id == stop_id)
                .ok_or_else(|| AppError::Internal(format!("stop {stop_id} missing from route")))?;
            (stop.target, stop.status)
        };

        let mut check_status = current;
        let mut check_delivered_at = None;
        apply_transition(&mut check_status, &mut check_delivered_at, status, now)?;

        match target {
            StopTarget::Delivery(id) => {
                self.apply_delivery_status(id, status, now)?;
            }
            StopTarget::Order(id) => {
                self.apply_order_status(id, status, now)?;
            }
        }

        let mut route = self
            .routes
            .get_mut(&route_id)
            .ok_or_else(|| AppError::Internal(format!("route {route_id} missing")))?;
        let stop = route
            .stops
            .iter_mut()
            .find(|stop| stop.id == stop_id)
            .ok_or_else(|| AppError::Internal(format!("stop {stop_id} missing from route")))?;

        apply_transition(&mut stop.status, &mut stop.delivered_at, status, now)?;
        if actual_minutes.is_some() {
            stop.actual_minutes = actual_minutes;
        }
        let stop = stop.clone();

        route.refresh_status();
        Ok((route.clone(), stop))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, NaiveDate, Utc};
    use uuid::Uuid;

    use super::{CreateOutcome, Storage};
    use crate::geo::Coordinate;
    use crate::models::delivery::DeliveryRequest;
    use crate::models::route::{Route, RouteStatus, RouteStop, StopTarget};
    use crate::models::status::DeliveryStatus;
    use crate::models::subscription::{Subscription, SubscriptionStatus};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()
    }

    fn seed_subscription(storage: &Storage) -> Uuid {
        seed_subscription_at(storage, Uuid::new_v4(), Utc::now())
    }

    fn seed_subscription_at(storage: &Storage, id: Uuid, created_at: DateTime<Utc>) -> Uuid {
        let subscription = Subscription {
            id,
            customer_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            address_id: Uuid::new_v4(),
            quantity: 2,
            days_of_week: r#"["wed"]"#.to_string(),
            start_date: date(),
            status: SubscriptionStatus::Active,
            created_at,
            updated_at: created_at,
        };
        storage.subscriptions.insert(id, subscription);
        id
    }

    fn request(subscription_id: Uuid) -> DeliveryRequest {
        DeliveryRequest {
            subscription_id,
            scheduled_date: date(),
            scheduled_for: date().and_hms_opt(6, 0, 0).unwrap().and_utc(),
            status: DeliveryStatus::Pending,
        }
    }

    fn seed_delivery(storage: &Storage) -> Uuid {
        let subscription_id = seed_subscription(storage);
        match storage.create_delivery(&request(subscription_id), Utc::now()) {
            Ok(CreateOutcome::Created(delivery)) => delivery.id,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    fn route_with_stops(agent_id: Uuid, targets: &[StopTarget]) -> Route {
        let route_id = Uuid::new_v4();
        let stops = targets
            .iter()
            .enumerate()
            .map(|(index, target)| RouteStop {
                id: Uuid::new_v4(),
                route_id,
                sequence: index as u32 + 1,
                target: *target,
                address_id: Uuid::new_v4(),
                status: DeliveryStatus::Pending,
                delivered_at: None,
                estimated_minutes: 5,
                actual_minutes: None,
            })
            .collect();

        Route {
            id: route_id,
            agent_id,
            date: date(),
            depot: Coordinate::DEFAULT_DEPOT,
            status: RouteStatus::Pending,
            total_distance_km: 0.0,
            estimated_minutes: 0,
            created_at: Utc::now(),
            stops,
        }
    }

    #[test]
    fn repeated_creation_is_idempotent() {
        let storage = Storage::new();
        let subscription_id = seed_subscription(&storage);

        let first = storage.create_delivery(&request(subscription_id), Utc::now()).unwrap();
        let created_id = match first {
            CreateOutcome::Created(delivery) => delivery.id,
            CreateOutcome::Duplicate(_) => panic!("first creation reported duplicate"),
        };

        let second = storage.create_delivery(&request(subscription_id), Utc::now()).unwrap();
        assert!(matches!(second, CreateOutcome::Duplicate(id) if id == created_id));
        assert_eq!(storage.deliveries_for_date(date()).len(), 1);
    }

    #[test]
    fn unknown_subscription_is_not_found() {
        let storage = Storage::new();
        assert!(storage.create_delivery(&request(Uuid::new_v4()), Utc::now()).is_err());
    }

    #[test]
    fn second_route_for_same_agent_and_date_conflicts() {
        let storage = Storage::new();
        let agent = Uuid::new_v4();

        storage
            .create_route(route_with_stops(agent, &[StopTarget::Order(Uuid::new_v4())]))
            .unwrap();
        let err = storage
            .create_route(route_with_stops(agent, &[StopTarget::Order(Uuid::new_v4())]))
            .unwrap_err();

        assert!(err.to_string().contains("already has route"));
        assert_eq!(storage.routes.len(), 1);
    }

    #[test]
    fn gapped_sequence_is_rejected_without_side_effects() {
        let storage = Storage::new();
        let agent = Uuid::new_v4();
        let mut route = route_with_stops(
            agent,
            &[
                StopTarget::Order(Uuid::new_v4()),
                StopTarget::Order(Uuid::new_v4()),
            ],
        );
        route.stops[1].sequence = 3;

        assert!(storage.create_route(route).is_err());
        assert!(storage.routes.is_empty());
        assert!(storage.route_for_agent(agent, date()).is_none());
    }

    #[test]
    fn stop_update_mirrors_to_delivery_and_rolls_up_route() {
        let storage = Storage::new();
        let subscription_id = seed_subscription(&storage);
        let delivery_id = match storage.create_delivery(&request(subscription_id), Utc::now()) {
            Ok(CreateOutcome::Created(delivery)) => delivery.id,
            other => panic!("unexpected outcome: {other:?}"),
        };

        let agent = Uuid::new_v4();
        let route = storage
            .create_route(route_with_stops(agent, &[StopTarget::Delivery(delivery_id)]))
            .unwrap();
        let stop_id = route.stops[0].id;

        let (route, stop) = storage
            .update_stop_status(stop_id, DeliveryStatus::InTransit, None, Utc::now())
            .unwrap();
        assert_eq!(stop.status, DeliveryStatus::InTransit);
        assert_eq!(route.status, RouteStatus::Active);

        let (route, stop) = storage
            .update_stop_status(stop_id, DeliveryStatus::Delivered, Some(7), Utc::now())
            .unwrap();
        assert_eq!(stop.actual_minutes, Some(7));
        assert!(stop.delivered_at.is_some());
        assert_eq!(route.status, RouteStatus::Completed);

        let delivery = storage.deliveries.get(&delivery_id).unwrap().clone();
        assert_eq!(delivery.status, DeliveryStatus::Delivered);
        assert!(delivery.delivered_at.is_some());
    }

    #[test]
    fn rejected_stop_transition_changes_nothing() {
        let storage = Storage::new();
        let subscription_id = seed_subscription(&storage);
        let delivery_id = match storage.create_delivery(&request(subscription_id), Utc::now()) {
            Ok(CreateOutcome::Created(delivery)) => delivery.id,
            other => panic!("unexpected outcome: {other:?}"),
        };
        let route = storage
            .create_route(route_with_stops(
                Uuid::new_v4(),
                &[StopTarget::Delivery(delivery_id)],
            ))
            .unwrap();
        let stop_id = route.stops[0].id;

        storage
            .update_stop_status(stop_id, DeliveryStatus::Failed, None, Utc::now())
            .unwrap();
        assert!(
            storage
                .update_stop_status(stop_id, DeliveryStatus::Delivered, None, Utc::now())
                .is_err()
        );

        let delivery = storage.deliveries.get(&delivery_id).unwrap().clone();
        assert_eq!(delivery.status, DeliveryStatus::Failed);
        assert!(delivery.delivered_at.is_none());
    }

    #[test]
    fn deliveries_follow_subscription_creation_order() {
        let storage = Storage::new();
        let first_created = Utc::now();
        // Ids sort the other way round from creation time.
        let older = seed_subscription_at(&storage, Uuid::from_u128(9), first_created);
        let newer = seed_subscription_at(
            &storage,
            Uuid::from_u128(1),
            first_created + Duration::minutes(1),
        );

        let run_at = Utc::now();
        storage.create_delivery(&request(newer), run_at).unwrap();
        storage.create_delivery(&request(older), run_at).unwrap();

        let order: Vec<Uuid> = storage
            .deliveries_for_date(date())
            .iter()
            .map(|delivery| delivery.subscription_id)
            .collect();
        assert_eq!(order, vec![older, newer]);
    }

    #[test]
    fn routed_target_cannot_be_reassigned() {
        let storage = Storage::new();
        let delivery_id = seed_delivery(&storage);
        let first_agent = Uuid::new_v4();
        storage.assign_delivery_agent(delivery_id, first_agent).unwrap();

        let route = storage
            .create_route(route_with_stops(first_agent, &[StopTarget::Delivery(delivery_id)]))
            .unwrap();
        assert_eq!(
            storage.stop_for(StopTarget::Delivery(delivery_id)),
            Some(route.stops[0].id)
        );

        let err = storage
            .assign_delivery_agent(delivery_id, Uuid::new_v4())
            .unwrap_err();
        assert!(err.to_string().contains("already on a route"));

        let delivery = storage.deliveries.get(&delivery_id).unwrap().clone();
        assert_eq!(delivery.agent_id, Some(first_agent));
    }

    #[test]
    fn target_on_another_route_is_rejected_and_claims_released() {
        let storage = Storage::new();
        let shared = StopTarget::Order(Uuid::new_v4());
        let fresh = StopTarget::Order(Uuid::new_v4());

        storage
            .create_route(route_with_stops(Uuid::new_v4(), &[shared]))
            .unwrap();

        let second_agent = Uuid::new_v4();
        let err = storage
            .create_route(route_with_stops(second_agent, &[fresh, shared]))
            .unwrap_err();
        assert!(err.to_string().contains("already on a route"));
        assert_eq!(storage.routes.len(), 1);
        assert!(storage.route_for_agent(second_agent, date()).is_none());
        assert!(storage.stop_for(fresh).is_none());

        // The released target can still be planned.
        storage
            .create_route(route_with_stops(second_agent, &[fresh]))
            .unwrap();
        assert!(storage.stop_for(fresh).is_some());
    }

    #[test]
    fn direct_delivery_update_moves_its_stop() {
        let storage = Storage::new();
        let delivery_id = seed_delivery(&storage);
        let other_delivery = seed_delivery(&storage);
        let route = storage
            .create_route(route_with_stops(
                Uuid::new_v4(),
                &[
                    StopTarget::Delivery(delivery_id),
                    StopTarget::Delivery(other_delivery),
                ],
            ))
            .unwrap();

        let change = storage
            .update_delivery_status(delivery_id, DeliveryStatus::Delivered, Utc::now())
            .unwrap();
        assert_eq!(change.record.status, DeliveryStatus::Delivered);
        let (updated_route, stop) = change.stop.expect("routed delivery has a stop");
        assert_eq!(stop.id, route.stops[0].id);
        assert_eq!(stop.status, DeliveryStatus::Delivered);
        assert_eq!(stop.delivered_at, change.record.delivered_at);
        assert_eq!(updated_route.status, RouteStatus::Active);

        let change = storage
            .update_delivery_status(other_delivery, DeliveryStatus::Failed, Utc::now())
            .unwrap();
        let (updated_route, _) = change.stop.unwrap();
        assert_eq!(updated_route.status, RouteStatus::Completed);
        assert_eq!(
            storage.route_for_agent(route.agent_id, date()).unwrap().status,
            RouteStatus::Completed
        );
    }

    #[test]
    fn unrouted_delivery_update_has_no_stop() {
        let storage = Storage::new();
        let delivery_id = seed_delivery(&storage);

        let change = storage
            .update_delivery_status(delivery_id, DeliveryStatus::InTransit, Utc::now())
            .unwrap();
        assert_eq!(change.record.status, DeliveryStatus::InTransit);
        assert!(change.stop.is_none());
    }

    #[test]
    fn rejected_direct_update_leaves_stop_untouched() {
        let storage = Storage::new();
        let delivery_id = seed_delivery(&storage);
        let route = storage
            .create_route(route_with_stops(
                Uuid::new_v4(),
                &[StopTarget::Delivery(delivery_id)],
            ))
            .unwrap();

        storage
            .update_delivery_status(delivery_id, DeliveryStatus::Failed, Utc::now())
            .unwrap();
        assert!(
            storage
                .update_delivery_status(delivery_id, DeliveryStatus::Delivered, Utc::now())
                .is_err()
        );

        let stored = storage.routes.get(&route.id).unwrap().clone();
        assert_eq!(stored.stops[0].status, DeliveryStatus::Failed);
        assert!(stored.stops[0].delivered_at.is_none());
    }
}
