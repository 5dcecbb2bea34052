use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Open,
    Evaluating,
    Closed,
    Awarded,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Open => "open",
            EventStatus::Evaluating => "evaluating",
            EventStatus::Closed => "closed",
            EventStatus::Awarded => "awarded",
            EventStatus::Cancelled => "cancelled",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EventStatus::Open => "Open",
            EventStatus::Evaluating => "Evaluating",
            EventStatus::Closed => "Closed",
            EventStatus::Awarded => "Awarded",
            EventStatus::Cancelled => "Cancelled",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    High,
    Medium,
    Low,
}

impl EventPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventPriority::High => "high",
            EventPriority::Medium => "medium",
            EventPriority::Low => "low",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Corporate,
    Conference,
    Wedding,
    Retreat,
    Training,
    ProductLaunch,
    BoardMeeting,
    HolidayParty,
}

impl EventType {
    pub const ALL: [EventType; 8] = [
        EventType::Corporate,
        EventType::Conference,
        EventType::Wedding,
        EventType::Retreat,
        EventType::Training,
        EventType::ProductLaunch,
        EventType::BoardMeeting,
        EventType::HolidayParty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Corporate => "corporate",
            EventType::Conference => "conference",
            EventType::Wedding => "wedding",
            EventType::Retreat => "retreat",
            EventType::Training => "training",
            EventType::ProductLaunch => "product_launch",
            EventType::BoardMeeting => "board_meeting",
            EventType::HolidayParty => "holiday_party",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Submitted,
    UnderReview,
    Shortlisted,
    Rejected,
    Accepted,
}

impl BidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BidStatus::Submitted => "submitted",
            BidStatus::UnderReview => "under_review",
            BidStatus::Shortlisted => "shortlisted",
            BidStatus::Rejected => "rejected",
            BidStatus::Accepted => "accepted",
        }
    }
}

/// An event looking for hotel bids.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: String,
    pub event_name: String,
    pub client_company: String,
    pub client_contact_name: String,
    pub client_contact_email: String,
    pub event_type: EventType,
    pub event_date: DateTime<Utc>,
    pub duration_days: u32,
    pub guest_count: u32,
    pub estimated_rooms_needed: u32,
    pub budget_min: f64,
    pub budget_max: f64,
    pub venue_requirements: String,
    pub special_requirements: String,
    pub catering_requirements: String,
    pub av_requirements: String,
    pub preferred_location: String,
    pub location_flexibility: bool,
    pub rfp_deadline: DateTime<Utc>,
    pub status: EventStatus,
    pub priority: EventPriority,
    pub assigned_manager: String,
    pub created_date: DateTime<Utc>,
    pub estimated_commission: f64,
    pub profit_margin_target: f64,
}

/// A hotel's offer for one event.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelBid {
    pub bid_id: String,
    pub event_id: String,
    pub hotel_name: String,
    pub hotel_chain: String,
    pub hotel_city: String,
    pub hotel_rating: f64,
    pub contact_person: String,
    pub contact_email: String,
    pub room_rate_per_night: f64,
    pub total_room_cost: f64,
    pub meeting_space_cost: f64,
    pub catering_cost_per_person: f64,
    pub total_catering_cost: f64,
    pub av_equipment_cost: f64,
    pub service_fees: f64,
    pub taxes_and_fees: f64,
    pub total_cost: f64,
    pub meeting_rooms: Vec<String>,
    pub amenities: Vec<String>,
    pub cancellation_policy: String,
    pub deposit_percentage: u32,
    pub payment_terms: String,
    pub submitted_date: DateTime<Utc>,
    pub response_time_hours: u32,
    pub status: BidStatus,
    pub past_events_with_us: u32,
    pub success_rate: f64,
    pub competitive_advantages: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessMetrics {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_events: usize,
    pub open_events: usize,
    pub closed_events: usize,
    pub awarded_events: usize,
    pub average_event_value: f64,
    pub total_revenue_pipeline: f64,
    pub confirmed_revenue: f64,
    pub projected_revenue: f64,
    pub average_commission: f64,
    pub revenue_growth_percentage: f64,
    pub average_response_time_hours: f64,
    pub bid_win_rate: f64,
    pub client_retention_rate: f64,
    pub total_bids_received: usize,
    pub average_bids_per_event: f64,
    pub top_performing_hotels: Vec<String>,
    pub most_profitable_event_types: Vec<String>,
    pub busiest_locations: Vec<String>,
    pub peak_months: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub active_events_count: usize,
    pub total_pipeline_value: f64,
    pub pending_decisions: usize,
    pub deadlines_this_week: usize,
    pub new_rfps_today: u32,
    pub bids_submitted_today: u32,
    pub decisions_made_today: u32,
    pub current_win_rate: f64,
    pub average_deal_size: f64,
    pub response_time_avg: f64,
    pub urgent_deadlines: Vec<String>,
    pub high_value_opportunities: Vec<String>,
}

/// Bid form submitted through `POST /api/process-bid-document`.
#[derive(Clone, Debug, Deserialize)]
pub struct NewBid {
    pub hotel_name: String,
    pub contact_person: String,
    pub total_cost: f64,
    pub room_rate: f64,
    #[serde(default, alias = "event")]
    pub event_id: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

impl NewBid {
    pub fn validate(&self) -> Result<(), String> {
        if self.hotel_name.trim().is_empty() {
            return Err("hotel_name is required".to_string());
        }
        if self.contact_person.trim().is_empty() {
            return Err("contact_person is required".to_string());
        }
        if !self.total_cost.is_finite() || self.total_cost < 0.0 {
            return Err("total_cost must be a non-negative number".to_string());
        }
        if !self.room_rate.is_finite() || self.room_rate < 0.0 {
            return Err("room_rate must be a non-negative number".to_string());
        }
        Ok(())
    }
}
