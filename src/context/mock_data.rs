use chrono::{ Duration, Utc };
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{ Rng, SeedableRng };
use serde::Serialize;

use crate::models::business::{
    BidStatus,
    BusinessMetrics,
    DashboardSummary,
    Event,
    EventPriority,
    EventStatus,
    EventType,
    HotelBid,
    NewBid,
};

const COMPANIES: &[&str] = &[
    "Microsoft", "Google", "Apple", "Meta", "Amazon", "Salesforce", "Oracle", "IBM", "Adobe",
    "Tesla", "Netflix", "Uber", "Airbnb", "Shopify", "Zoom", "Slack", "DocuSign", "HubSpot",
    "Zendesk", "Atlassian", "ServiceNow", "Workday", "Palantir", "Snowflake",
];

const HOTEL_CHAINS: &[&str] = &[
    "Marriott", "Hilton", "Hyatt", "InterContinental", "Sheraton", "Westin", "DoubleTree",
    "Embassy Suites", "Courtyard", "Residence Inn", "Hampton Inn", "Holiday Inn", "Crowne Plaza",
    "Four Seasons", "Ritz-Carlton",
];

const CITIES: &[&str] = &[
    "San Francisco", "New York", "Chicago", "Los Angeles", "Seattle", "Boston", "Austin", "Denver",
    "Miami", "Atlanta", "Dallas", "Philadelphia", "San Diego", "Phoenix", "Las Vegas",
];

const MANAGERS: &[&str] = &[
    "Sarah Johnson", "Michael Chen", "Lisa Rodriguez", "David Kim", "Amanda Williams",
    "Robert Taylor", "Jennifer Davis", "Mark Thompson",
];

const FIRST_NAMES: &[&str] = &["John", "Sarah", "Mike", "Lisa", "David", "Amanda", "Robert", "Jennifer"];
const SURNAMES: &[&str] = &["Smith", "Johnson", "Williams", "Brown", "Davis", "Miller", "Wilson", "Moore"];

const AMENITIES: &[&str] = &[
    "High-speed WiFi", "AV Equipment", "Parking", "Fitness Center", "Business Center", "Concierge",
    "Room Service", "Spa Services", "Airport Shuttle", "Catering Services", "Breakout Rooms",
    "Executive Lounge",
];

const MEETING_ROOMS: &[&str] = &[
    "Grand Ballroom", "Executive Boardroom", "Conference Room A", "Conference Room B",
    "Breakout Room 1", "Breakout Room 2", "Theater", "Auditorium", "Classroom", "Reception Hall",
    "Exhibit Hall", "Rooftop Terrace",
];

const ADVANTAGES: &[&str] = &[
    "Prime downtown location", "State-of-the-art AV equipment", "Award-winning catering",
    "Dedicated event coordinator", "Flexible meeting spaces", "24/7 business center",
];

const CANCELLATION_POLICIES: &[&str] = &[
    "Free cancellation up to 48 hours", "Free cancellation up to 72 hours",
    "50% refund if cancelled within 7 days", "Standard cancellation policy",
];

const PAYMENT_TERMS: &[&str] = &[
    "Net 30", "Net 15", "50% upfront, 50% on completion", "Full payment 30 days prior",
];

/// Point-in-time view of the business data the assistant is grounded in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessSnapshot {
    pub events: Vec<Event>,
    pub bids: Vec<HotelBid>,
    pub metrics: BusinessMetrics,
    pub dashboard: DashboardSummary,
    pub generated_at: chrono::DateTime<Utc>,
}

struct Requirements {
    venue: String,
    special: String,
    catering: String,
    av: String,
}

pub struct MockDataGenerator {
    rng: StdRng,
}

impl MockDataGenerator {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { rng }
    }

    fn pick<T: Copy>(&mut self, items: &[T]) -> T {
        items.choose(&mut self.rng).copied().unwrap_or(items[0])
    }

    fn pick_many(&mut self, items: &[&str], min: usize, max: usize) -> Vec<String> {
        let n = self.rng.random_range(min..=max).min(items.len());
        items
            .choose_multiple(&mut self.rng, n)
            .map(|s| s.to_string())
            .collect()
    }

    fn weighted<T: Copy>(&mut self, options: &[(T, u32)]) -> T {
        let total: u32 = options.iter().map(|(_, w)| *w).sum();
        let mut roll = self.rng.random_range(0..total.max(1));
        for (item, weight) in options {
            if roll < *weight {
                return *item;
            }
            roll -= *weight;
        }
        options[options.len() - 1].0
    }

    fn person(&mut self) -> String {
        format!("{} {}", self.pick(FIRST_NAMES), self.pick(SURNAMES))
    }

    fn event_name(&mut self, event_type: EventType, company: &str) -> String {
        let templates: &[&str] = match event_type {
            EventType::Corporate => &[
                "Annual Sales Conference", "Q{} Review Meeting", "Leadership Summit",
                "All-Hands Meeting", "Strategy Planning Session",
            ],
            EventType::Conference => &[
                "Tech Conference {}", "Innovation Summit", "Digital Transformation Forum",
                "Industry Leaders Summit", "Executive Forum",
            ],
            EventType::Training => &[
                "Leadership Development Program", "Sales Training Workshop",
                "Technical Skills Bootcamp", "Compliance Training Session",
            ],
            EventType::ProductLaunch => &[
                "{} Product Launch", "New Platform Unveiling", "Product Demo Day",
                "Innovation Showcase",
            ],
            EventType::Retreat => &[
                "Executive Retreat", "Team Building Retreat", "Strategic Planning Retreat",
                "Leadership Offsite",
            ],
            EventType::Wedding => &["Wedding Reception", "Wedding Celebration", "Rehearsal Dinner"],
            EventType::BoardMeeting => &[
                "Board Meeting", "Quarterly Board Review", "Strategic Board Session",
            ],
            EventType::HolidayParty => &[
                "Holiday Party", "Year-End Celebration", "Annual Holiday Event",
            ],
        };
        let template = self.pick(templates);
        if template.contains("Q{}") {
            let quarter = self.rng.random_range(1..=4).to_string();
            template.replace("{}", &quarter)
        } else if template.contains("{}") {
            template.replace("{}", company)
        } else {
            format!("{} {}", company, template)
        }
    }

    fn requirements(event_type: EventType, guests: u32) -> Requirements {
        let (venue, special, catering, av) = match event_type {
            EventType::Corporate => (
                format!("Main auditorium for {}, plus 3-4 breakout rooms for 25-50 people each", guests),
                "Executive green room, registration area, branded signage space",
                "Continental breakfast, lunch, and networking reception",
                "Professional AV with wireless mics, large screens, live streaming capability",
            ),
            EventType::BoardMeeting => (
                format!("Executive boardroom for {} with privacy", guests),
                "Confidential document handling, secure parking",
                "Premium catering, executive lunch service",
                "High-end video conferencing, multiple screens",
            ),
            EventType::Training => (
                format!("Classroom setup for {} with tables", guests),
                "Hands-on workspace, reliable WiFi for all attendees",
                "Light refreshments, working lunch",
                "Interactive whiteboards, laptop connections",
            ),
            EventType::ProductLaunch => (
                format!("Theater-style seating for {}, stage area", guests),
                "Product display area, media interview space, branded environment",
                "Premium reception, cocktail service",
                "Professional lighting, sound system, live streaming",
            ),
            _ => (
                format!("Meeting space for {} people", guests),
                "",
                "Standard business catering",
                "Basic AV setup with microphones and projector",
            ),
        };
        Requirements {
            venue,
            special: special.to_string(),
            catering: catering.to_string(),
            av: av.to_string(),
        }
    }

    pub fn generate_events(&mut self, count: usize) -> Vec<Event> {
        let now = Utc::now();
        let mut events = Vec::with_capacity(count);

        for _ in 0..count {
            let company = self.pick(COMPANIES);
            let event_type = self.pick(&EventType::ALL);
            let event_name = self.event_name(event_type, company);

            let event_date = now + Duration::days(self.rng.random_range(15..=365));
            let rfp_deadline = event_date - Duration::days(self.rng.random_range(14..=60));

            let (min_guests, max_guests) = match event_type {
                EventType::BoardMeeting => (10, 25),
                EventType::Training => (20, 100),
                EventType::Corporate => (50, 500),
                EventType::Conference => (100, 1000),
                EventType::ProductLaunch => (75, 300),
                EventType::Retreat => (15, 75),
                _ => (50, 200),
            };
            let guest_count: u32 = self.rng.random_range(min_guests..=max_guests);

            let cost_per_person: u32 = match event_type {
                EventType::BoardMeeting => self.rng.random_range(200..=500),
                EventType::Training => self.rng.random_range(150..=300),
                EventType::Corporate => self.rng.random_range(200..=400),
                EventType::Conference => self.rng.random_range(300..=600),
                EventType::ProductLaunch => self.rng.random_range(400..=800),
                EventType::Retreat => self.rng.random_range(250..=500),
                _ => 300,
            };
            let base_budget = f64::from(guest_count * cost_per_person);
            let req = Self::requirements(event_type, guest_count);

            let domain = company.to_lowercase().replace(' ', "");
            let mailbox = self.pick(&["events", "planning", "meetings"]);

            events.push(Event {
                event_id: format!("EVT{:08X}", self.rng.random::<u32>()),
                event_name,
                client_company: company.to_string(),
                client_contact_name: self.person(),
                client_contact_email: format!("{}@{}.com", mailbox, domain),
                event_type,
                event_date,
                duration_days: self.pick(&[1, 1, 1, 2, 2, 3]),
                guest_count,
                estimated_rooms_needed: ((guest_count as f64) * self.rng.random_range(0.6..0.9)) as u32,
                budget_min: (base_budget * 0.8).floor(),
                budget_max: (base_budget * 1.4).floor(),
                venue_requirements: req.venue,
                special_requirements: req.special,
                catering_requirements: req.catering,
                av_requirements: req.av,
                preferred_location: self.pick(CITIES).to_string(),
                location_flexibility: self.rng.random_bool(0.5),
                rfp_deadline,
                status: self.weighted(&[
                    (EventStatus::Open, 50),
                    (EventStatus::Evaluating, 25),
                    (EventStatus::Closed, 15),
                    (EventStatus::Awarded, 10),
                ]),
                priority: self.weighted(&[
                    (EventPriority::High, 20),
                    (EventPriority::Medium, 60),
                    (EventPriority::Low, 20),
                ]),
                assigned_manager: self.pick(MANAGERS).to_string(),
                created_date: now - Duration::days(self.rng.random_range(1..=30)),
                estimated_commission: f64::from(self.rng.random_range(5000..=25000u32)),
                profit_margin_target: self.rng.random_range(15.0..35.0),
            });
        }

        events
    }

    pub fn generate_hotel_bids(&mut self, events: &[Event]) -> Vec<HotelBid> {
        let now = Utc::now();
        let mut bids = Vec::new();

        for event in events.iter().filter(|e| e.status != EventStatus::Cancelled) {
            let bid_count = self.rng.random_range(3..=7);
            for _ in 0..bid_count {
                let chain = self.pick(HOTEL_CHAINS);
                let rooms = if event.estimated_rooms_needed > 0 {
                    event.estimated_rooms_needed
                } else {
                    event.guest_count
                };

                let room_rate = f64::from(self.rng.random_range(120..=450u32));
                let meeting_space_cost = f64::from(self.rng.random_range(1500..=8000u32));
                let catering_per_person = f64::from(self.rng.random_range(35..=120u32));
                let days = f64::from(event.duration_days);

                let total_room_cost = room_rate * f64::from(rooms) * days;
                let total_catering_cost = catering_per_person * f64::from(event.guest_count) * days;
                let av_cost = f64::from(self.rng.random_range(500..=3000u32));
                let subtotal = total_room_cost + meeting_space_cost + total_catering_cost;
                let service_fees = subtotal * 0.08;
                let taxes = (subtotal + service_fees) * 0.12;
                let total_cost = subtotal + av_cost + service_fees + taxes;

                let contact_person = self.person();
                let chain_domain = chain.to_lowercase().replace(' ', "");
                let advantage_count = self.rng.random_range(1..=3);

                bids.push(HotelBid {
                    bid_id: format!("BID{:08X}", self.rng.random::<u32>()),
                    event_id: event.event_id.clone(),
                    hotel_name: format!("{} {}", chain, event.preferred_location),
                    hotel_chain: chain.to_string(),
                    hotel_city: event.preferred_location.clone(),
                    hotel_rating: (self.rng.random_range(3.2..4.8_f64) * 10.0).round() / 10.0,
                    contact_email: format!(
                        "{}@{}.com",
                        contact_person.to_lowercase().replace(' ', "."),
                        chain_domain
                    ),
                    contact_person,
                    room_rate_per_night: room_rate,
                    total_room_cost,
                    meeting_space_cost,
                    catering_cost_per_person: catering_per_person,
                    total_catering_cost,
                    av_equipment_cost: av_cost,
                    service_fees,
                    taxes_and_fees: taxes,
                    total_cost,
                    meeting_rooms: self.pick_many(MEETING_ROOMS, 2, 6),
                    amenities: self.pick_many(AMENITIES, 4, 8),
                    cancellation_policy: self.pick(CANCELLATION_POLICIES).to_string(),
                    deposit_percentage: self.pick(&[10, 15, 20, 25, 30]),
                    payment_terms: self.pick(PAYMENT_TERMS).to_string(),
                    submitted_date: now - Duration::days(self.rng.random_range(1..=10)),
                    response_time_hours: self.rng.random_range(2..=48),
                    status: self.weighted(&[
                        (BidStatus::Submitted, 40),
                        (BidStatus::UnderReview, 35),
                        (BidStatus::Shortlisted, 25),
                    ]),
                    past_events_with_us: self.rng.random_range(0..=15),
                    success_rate: self.rng.random_range(65.0..95.0),
                    competitive_advantages: (0..advantage_count)
                        .map(|_| self.pick(ADVANTAGES).to_string())
                        .collect(),
                });
            }
        }

        bids
    }

    pub fn generate_business_metrics(&mut self, events: &[Event], bids: &[HotelBid]) -> BusinessMetrics {
        let now = Utc::now();
        let mut metrics = BusinessMetrics {
            period_start: now - Duration::days(30),
            period_end: now,
            total_events: 0,
            open_events: 0,
            closed_events: 0,
            awarded_events: 0,
            average_event_value: 0.0,
            total_revenue_pipeline: 0.0,
            confirmed_revenue: 0.0,
            projected_revenue: 0.0,
            average_commission: 0.0,
            revenue_growth_percentage: self.rng.random_range(5.0..25.0),
            average_response_time_hours: self.rng.random_range(8.0..16.0),
            bid_win_rate: self.rng.random_range(25.0..40.0),
            client_retention_rate: self.rng.random_range(70.0..90.0),
            total_bids_received: 0,
            average_bids_per_event: 0.0,
            top_performing_hotels: (0..5)
                .map(|_| format!("{} {}", self.pick(HOTEL_CHAINS), self.pick(CITIES)))
                .collect(),
            most_profitable_event_types: EventType::ALL
                .choose_multiple(&mut self.rng, 3)
                .map(|t| t.as_str().to_string())
                .collect(),
            busiest_locations: self.pick_many(CITIES, 5, 5),
            peak_months: ["March", "April", "September", "October", "November"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
        };
        apply_metric_totals(&mut metrics, events, bids);
        metrics
    }

    pub fn generate_dashboard_summary(&mut self, events: &[Event], bids: &[HotelBid]) -> DashboardSummary {
        let mut dashboard = DashboardSummary {
            active_events_count: 0,
            total_pipeline_value: 0.0,
            pending_decisions: 0,
            deadlines_this_week: 0,
            new_rfps_today: self.rng.random_range(0..=3),
            bids_submitted_today: self.rng.random_range(2..=8),
            decisions_made_today: self.rng.random_range(0..=2),
            current_win_rate: self.rng.random_range(28.0..45.0),
            average_deal_size: 0.0,
            response_time_avg: self.rng.random_range(6.0..18.0),
            urgent_deadlines: Vec::new(),
            high_value_opportunities: Vec::new(),
        };
        apply_dashboard_totals(&mut dashboard, events, bids);
        dashboard
    }

    pub fn generate_snapshot(&mut self, event_count: usize) -> BusinessSnapshot {
        let events = self.generate_events(event_count);
        let bids = self.generate_hotel_bids(&events);
        let metrics = self.generate_business_metrics(&events, &bids);
        let dashboard = self.generate_dashboard_summary(&events, &bids);
        BusinessSnapshot {
            events,
            bids,
            metrics,
            dashboard,
            generated_at: Utc::now(),
        }
    }
}

fn pipeline(bids: &[HotelBid]) -> f64 {
    bids.iter().map(|b| b.total_cost).sum()
}

fn apply_metric_totals(metrics: &mut BusinessMetrics, events: &[Event], bids: &[HotelBid]) {
    let total_pipeline = pipeline(bids);
    metrics.total_events = events.len();
    metrics.open_events = events.iter().filter(|e| e.status == EventStatus::Open).count();
    metrics.closed_events = events
        .iter()
        .filter(|e| matches!(e.status, EventStatus::Closed | EventStatus::Awarded))
        .count();
    metrics.awarded_events = events.iter().filter(|e| e.status == EventStatus::Awarded).count();
    metrics.total_revenue_pipeline = total_pipeline;
    metrics.confirmed_revenue = bids
        .iter()
        .filter(|b| b.status == BidStatus::Accepted)
        .map(|b| b.total_cost)
        .sum();
    metrics.projected_revenue = total_pipeline * 0.3;
    metrics.total_bids_received = bids.len();
    if bids.is_empty() {
        metrics.average_event_value = 0.0;
        metrics.average_commission = 0.0;
    } else {
        metrics.average_event_value = total_pipeline / (bids.len() as f64);
        metrics.average_commission = (total_pipeline * 0.12) / (bids.len() as f64);
    }
    metrics.average_bids_per_event = if events.is_empty() {
        0.0
    } else {
        (bids.len() as f64) / (events.len() as f64)
    };
}

fn apply_dashboard_totals(dashboard: &mut DashboardSummary, events: &[Event], bids: &[HotelBid]) {
    let week_ahead = Utc::now() + Duration::days(7);
    let mut active: Vec<&Event> = events
        .iter()
        .filter(|e| e.status == EventStatus::Open)
        .collect();

    dashboard.active_events_count = active.len();
    dashboard.total_pipeline_value = pipeline(bids);
    dashboard.pending_decisions = events
        .iter()
        .filter(|e| e.status == EventStatus::Evaluating)
        .count();
    dashboard.deadlines_this_week = active
        .iter()
        .filter(|e| e.rfp_deadline <= week_ahead)
        .count();
    dashboard.average_deal_size = if bids.is_empty() {
        0.0
    } else {
        dashboard.total_pipeline_value / (bids.len() as f64)
    };

    active.sort_by_key(|e| e.rfp_deadline);
    dashboard.urgent_deadlines = active
        .iter()
        .take(3)
        .map(|e| format!("{} (Due: {})", e.event_name, e.rfp_deadline.format("%m/%d")))
        .collect();

    active.sort_by(|a, b| b.budget_max.total_cmp(&a.budget_max));
    dashboard.high_value_opportunities = active
        .iter()
        .take(3)
        .map(|e| format!("{} ({})", e.event_name, format_money(e.budget_max)))
        .collect();
}

/// Recomputes every derived total after bids were added to `snapshot`.
pub fn recompute_totals(snapshot: &mut BusinessSnapshot) {
    apply_metric_totals(&mut snapshot.metrics, &snapshot.events, &snapshot.bids);
    apply_dashboard_totals(&mut snapshot.dashboard, &snapshot.events, &snapshot.bids);
}

/// Turns a submitted bid form into a full bid. `sequence` is 1-based.
pub fn runtime_bid(sequence: usize, form: &NewBid) -> HotelBid {
    let hotel_name = form.hotel_name.trim().to_string();
    let contact_person = form.contact_person.trim().to_string();
    let total = form.total_cost;
    let hotel_chain = hotel_name
        .split_whitespace()
        .next()
        .unwrap_or("Independent")
        .to_string();

    HotelBid {
        bid_id: format!("BID-NEW-{:03}", sequence),
        event_id: form.event_id.clone().unwrap_or_else(|| "EVT001".to_string()),
        hotel_chain,
        hotel_city: form.city.clone().unwrap_or_else(|| "Downtown".to_string()),
        hotel_rating: 4.5,
        contact_email: format!(
            "{}@{}.com",
            contact_person.to_lowercase().replace(' ', "."),
            hotel_name.to_lowercase().replace(' ', "")
        ),
        hotel_name,
        contact_person,
        room_rate_per_night: form.room_rate,
        total_room_cost: total * 0.6,
        meeting_space_cost: 5000.0,
        catering_cost_per_person: 75.0,
        total_catering_cost: 15000.0,
        av_equipment_cost: 2000.0,
        service_fees: total * 0.08,
        taxes_and_fees: total * 0.12,
        total_cost: total,
        meeting_rooms: vec!["Conference Room A".to_string(), "Boardroom".to_string()],
        amenities: vec!["WiFi".to_string(), "Parking".to_string(), "AV Equipment".to_string()],
        cancellation_policy: "Standard cancellation policy".to_string(),
        deposit_percentage: 25,
        payment_terms: "Net 30".to_string(),
        submitted_date: Utc::now(),
        response_time_hours: 2,
        status: BidStatus::Submitted,
        past_events_with_us: 5,
        success_rate: 85.0,
        competitive_advantages: vec!["New bid".to_string(), "AI processed".to_string()],
    }
}

/// `$1,234,567` style, whole dollars.
pub fn format_money(amount: f64) -> String {
    let whole = amount.round() as i64;
    let digits = whole.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if whole < 0 {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_generation_is_deterministic() {
        let a = MockDataGenerator::new(Some(7)).generate_snapshot(5);
        let b = MockDataGenerator::new(Some(7)).generate_snapshot(5);
        let names_a: Vec<_> = a.events.iter().map(|e| e.event_name.clone()).collect();
        let names_b: Vec<_> = b.events.iter().map(|e| e.event_name.clone()).collect();
        assert_eq!(names_a, names_b);
        assert_eq!(a.bids.len(), b.bids.len());
    }

    #[test]
    fn snapshot_totals_are_consistent() {
        let snap = MockDataGenerator::new(Some(42)).generate_snapshot(15);
        assert_eq!(snap.events.len(), 15);
        assert!(snap.bids.len() >= 15 * 3);
        assert_eq!(snap.metrics.total_bids_received, snap.bids.len());

        let expected: f64 = snap.bids.iter().map(|b| b.total_cost).sum();
        assert!((snap.dashboard.total_pipeline_value - expected).abs() < 1e-6);
        assert!((snap.metrics.total_revenue_pipeline - expected).abs() < 1e-6);
        for event in &snap.events {
            assert!(event.budget_min <= event.budget_max);
            assert!(event.rfp_deadline < event.event_date);
        }
    }

    #[test]
    fn runtime_bid_gets_sequential_id() {
        let form = NewBid {
            hotel_name: "Hilton Austin".into(),
            contact_person: "Jane Roe".into(),
            total_cost: 50_000.0,
            room_rate: 210.0,
            event_id: None,
            city: Some("Austin".into()),
        };
        let bid = runtime_bid(3, &form);
        assert_eq!(bid.bid_id, "BID-NEW-003");
        assert_eq!(bid.hotel_chain, "Hilton");
        assert_eq!(bid.contact_email, "jane.roe@hiltonaustin.com");
        assert!((bid.service_fees - 4000.0).abs() < 1e-9);
    }

    #[test]
    fn money_is_grouped() {
        assert_eq!(format_money(1234567.4), "$1,234,567");
        assert_eq!(format_money(999.0), "$999");
        assert_eq!(format_money(0.0), "$0");
    }
}
