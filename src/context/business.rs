use chrono::Utc;
use log::{ debug, info };
use serde_json::{ json, Value };
use std::collections::BTreeMap;
use std::sync::{ Arc, Mutex, RwLock };

use super::mock_data::{ format_money, recompute_totals, runtime_bid, MockDataGenerator };
use super::{ ContextError, ContextKind, ContextSource, ContextStats };
use crate::config::prompt::PromptConfig;
use crate::models::business::{ EventStatus, HotelBid, NewBid };

pub use super::mock_data::BusinessSnapshot;

const EXCERPT_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Events,
    Bids,
    Metrics,
}

/// Trigger words (matched case-insensitively as substrings) and the data
/// section each one pulls into the system instruction.
pub const EXCERPT_RULES: &[(&[&str], Section)] = &[
    (&["event", "conference"], Section::Events),
    (&["hotel", "bid"], Section::Bids),
    (&["revenue", "pipeline"], Section::Metrics),
];

/// Sections whose trigger words appear in `message`, in rule order.
/// A message that triggers nothing gets the metrics section.
pub fn sections_for(message: &str) -> Vec<Section> {
    let lowered = message.to_lowercase();
    let matched: Vec<Section> = EXCERPT_RULES.iter()
        .filter(|(words, _)| words.iter().any(|w| lowered.contains(w)))
        .map(|(_, section)| *section)
        .collect();
    if matched.is_empty() {
        vec![Section::Metrics]
    } else {
        matched
    }
}

/// Grounds answers in a synthetic business snapshot.
pub struct BusinessSource {
    snapshot: RwLock<Arc<BusinessSnapshot>>,
    pending: Mutex<Vec<HotelBid>>,
    submitted: Mutex<usize>,
}

impl BusinessSource {
    pub fn generate(event_count: usize, seed: Option<u64>) -> Self {
        let snapshot = MockDataGenerator::new(seed).generate_snapshot(event_count);
        info!(
            "Generated business snapshot: {} events, {} bids",
            snapshot.events.len(),
            snapshot.bids.len()
        );
        Self::from_snapshot(snapshot)
    }

    pub fn from_snapshot(snapshot: BusinessSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            pending: Mutex::new(Vec::new()),
            submitted: Mutex::new(0),
        }
    }

    pub fn snapshot(&self) -> Arc<BusinessSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Queues a submitted bid. It becomes part of the snapshot on the next `refresh`.
    pub fn add_bid(&self, form: &NewBid) -> HotelBid {
        let sequence = {
            let mut submitted = self.submitted.lock().unwrap_or_else(|e| e.into_inner());
            *submitted += 1;
            *submitted
        };
        let bid = runtime_bid(sequence, form);
        debug!("Queued bid {} from {}", bid.bid_id, bid.hotel_name);
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(bid.clone());
        bid
    }

    /// Numbers for the dashboard: headline metrics plus the first four events.
    pub fn dashboard_metrics(&self) -> Value {
        let snap = self.snapshot();
        let now = Utc::now();
        let total_pipeline: f64 = snap.bids.iter().map(|b| b.total_cost).sum();
        let active_events = snap.events
            .iter()
            .filter(|e| e.status == EventStatus::Open)
            .count();
        let pending_decisions = snap.events
            .iter()
            .filter(|e| e.status == EventStatus::Evaluating)
            .count();
        let avg_deal_size = if snap.bids.is_empty() {
            0.0
        } else {
            total_pipeline / (snap.bids.len() as f64)
        };

        let events: Vec<Value> = snap.events
            .iter()
            .take(4)
            .map(|event| {
                let progress = match event.status {
                    EventStatus::Evaluating => 75,
                    EventStatus::Open => 45,
                    _ => 100,
                };
                json!({
                    "id": event.event_id,
                    "name": event.event_name,
                    "company": event.client_company,
                    "value": event.budget_max,
                    "deadline": event.rfp_deadline.to_rfc3339(),
                    "priority": event.priority.as_str(),
                    "status": event.status.label(),
                    "guests": event.guest_count,
                    "location": event.preferred_location,
                    "daysLeft": (event.rfp_deadline - now).num_days(),
                    "progress": progress,
                    "manager": event.assigned_manager,
                    "bidCount": snap.bids.iter().filter(|b| b.event_id == event.event_id).count(),
                })
            })
            .collect();

        json!({
            "metrics": {
                "totalPipeline": total_pipeline,
                "activeEvents": active_events,
                "pendingDecisions": pending_decisions,
                "winRate": snap.dashboard.current_win_rate,
                "avgDealSize": avg_deal_size,
                "deadlinesThisWeek": snap.dashboard.deadlines_this_week,
                "newRfpsToday": snap.dashboard.new_rfps_today,
                "bidsSubmittedToday": snap.dashboard.bids_submitted_today,
                "revenueGrowth": snap.metrics.revenue_growth_percentage,
            },
            "events": events,
            "timestamp": now.to_rfc3339(),
        })
    }
}

fn overview(snap: &BusinessSnapshot) -> String {
    let d = &snap.dashboard;
    let mut lines = vec![
        format!("Snapshot generated: {}", snap.generated_at.format("%Y-%m-%d %H:%M UTC")),
        format!(
            "Events: {} total, {} open, {} awaiting decision",
            snap.events.len(),
            d.active_events_count,
            d.pending_decisions
        ),
        format!("Bids received: {}", snap.bids.len()),
        format!("Pipeline value: {}", format_money(d.total_pipeline_value)),
        format!("Average deal size: {}", format_money(d.average_deal_size)),
        format!("Current win rate: {:.1}%", d.current_win_rate),
        format!("RFP deadlines this week: {}", d.deadlines_this_week)
    ];
    if !d.urgent_deadlines.is_empty() {
        lines.push(format!("Urgent deadlines: {}", d.urgent_deadlines.join("; ")));
    }
    if !d.high_value_opportunities.is_empty() {
        lines.push(format!("High-value opportunities: {}", d.high_value_opportunities.join("; ")));
    }
    lines.join("\n")
}

fn events_excerpt(snap: &BusinessSnapshot) -> String {
    let mut events: Vec<_> = snap.events.iter().collect();
    events.sort_by_key(|e| e.rfp_deadline);

    let mut lines = vec![format!("EVENTS (next {} RFP deadlines):", EXCERPT_LIMIT.min(events.len()))];
    for e in events.into_iter().take(EXCERPT_LIMIT) {
        let bid_count = snap.bids
            .iter()
            .filter(|b| b.event_id == e.event_id)
            .count();
        lines.push(
            format!(
                "- {} | {} for {} | {} | {} guests | {} | budget {}-{} | RFP due {} | {} | {} priority | {} bids | manager {}",
                e.event_id,
                e.event_name,
                e.client_company,
                e.event_type.as_str(),
                e.guest_count,
                e.preferred_location,
                format_money(e.budget_min),
                format_money(e.budget_max),
                e.rfp_deadline.format("%Y-%m-%d"),
                e.status.label(),
                e.priority.as_str(),
                bid_count,
                e.assigned_manager
            )
        );
    }
    lines.join("\n")
}

fn bids_excerpt(snap: &BusinessSnapshot) -> String {
    let mut bids: Vec<_> = snap.bids.iter().collect();
    bids.sort_by(|a, b| a.total_cost.total_cmp(&b.total_cost));

    let mut lines = vec![
        format!("HOTEL BIDS ({} lowest-cost of {}):", EXCERPT_LIMIT.min(bids.len()), bids.len())
    ];
    for b in bids.into_iter().take(EXCERPT_LIMIT) {
        lines.push(
            format!(
                "- {} | {} ({}, {:.1}/5) for {} | total {} | room {}/night | meeting space {} | {} | success rate {:.0}% | {} past events",
                b.bid_id,
                b.hotel_name,
                b.hotel_city,
                b.hotel_rating,
                b.event_id,
                format_money(b.total_cost),
                format_money(b.room_rate_per_night),
                format_money(b.meeting_space_cost),
                b.status.as_str(),
                b.success_rate,
                b.past_events_with_us
            )
        );
    }
    lines.join("\n")
}

fn metrics_excerpt(snap: &BusinessSnapshot) -> String {
    let m = &snap.metrics;
    [
        "FINANCIAL METRICS:".to_string(),
        format!(
            "- Period: {} to {}",
            m.period_start.format("%Y-%m-%d"),
            m.period_end.format("%Y-%m-%d")
        ),
        format!("- Revenue pipeline: {}", format_money(m.total_revenue_pipeline)),
        format!("- Confirmed revenue: {}", format_money(m.confirmed_revenue)),
        format!("- Projected revenue: {}", format_money(m.projected_revenue)),
        format!("- Average commission: {}", format_money(m.average_commission)),
        format!("- Revenue growth: {:.1}%", m.revenue_growth_percentage),
        format!("- Bid win rate: {:.1}%", m.bid_win_rate),
        format!("- Client retention: {:.1}%", m.client_retention_rate),
        format!("- Average bids per event: {:.1}", m.average_bids_per_event),
        format!("- Top hotels: {}", m.top_performing_hotels.join(", ")),
        format!("- Most profitable event types: {}", m.most_profitable_event_types.join(", ")),
        format!("- Busiest locations: {}", m.busiest_locations.join(", ")),
    ].join("\n")
}

fn excerpt(snap: &BusinessSnapshot, sections: &[Section]) -> String {
    sections
        .iter()
        .map(|section| match section {
            Section::Events => events_excerpt(snap),
            Section::Bids => bids_excerpt(snap),
            Section::Metrics => metrics_excerpt(snap),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

impl ContextSource for BusinessSource {
    fn kind(&self) -> ContextKind {
        ContextKind::Business
    }

    fn grounding_text(&self) -> Result<String, ContextError> {
        let snap = self.snapshot();
        if snap.events.is_empty() {
            return Err(ContextError::NotLoaded("business snapshot has no events".to_string()));
        }
        Ok(overview(&snap))
    }

    fn summary_stats(&self) -> Result<ContextStats, ContextError> {
        let snap = self.snapshot();
        let mut counts = BTreeMap::new();
        counts.insert("events".to_string(), snap.events.len());
        counts.insert("bids".to_string(), snap.bids.len());
        counts.insert("activeEvents".to_string(), snap.dashboard.active_events_count);
        counts.insert("pendingDecisions".to_string(), snap.dashboard.pending_decisions);
        Ok(ContextStats {
            source: ContextKind::Business.as_str(),
            title: "Business data snapshot".to_string(),
            counts,
        })
    }

    fn system_instruction(
        &self,
        prompts: &PromptConfig,
        user_message: &str
    ) -> Result<String, ContextError> {
        let overview = self.grounding_text()?;
        let snap = self.snapshot();
        let sections = sections_for(user_message);
        debug!("Business excerpt sections: {:?}", sections);
        Ok(prompts.business_prompt(&overview, &excerpt(&snap, &sections)))
    }

    fn refresh(&self) -> Result<(), ContextError> {
        let added: Vec<HotelBid> = std::mem::take(
            &mut *self.pending.lock().unwrap_or_else(|e| e.into_inner())
        );
        if added.is_empty() {
            return Ok(());
        }

        let mut guard = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        let mut next = BusinessSnapshot::clone(&guard);
        next.bids.extend(added);
        recompute_totals(&mut next);
        next.generated_at = Utc::now();
        info!("Business snapshot refreshed: {} bids", next.bids.len());
        *guard = Arc::new(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> NewBid {
        NewBid {
            hotel_name: "Marriott Denver".into(),
            contact_person: "Ana Lee".into(),
            total_cost: 80_000.0,
            room_rate: 240.0,
            event_id: None,
            city: None,
        }
    }

    #[test]
    fn keyword_rules_pick_sections() {
        assert_eq!(sections_for("Which conference is next?"), vec![Section::Events]);
        assert_eq!(sections_for("Best HOTEL bids please"), vec![Section::Bids]);
        assert_eq!(sections_for("events and revenue"), vec![Section::Events, Section::Metrics]);
        assert_eq!(sections_for("hello there"), vec![Section::Metrics]);
    }

    #[test]
    fn instruction_carries_overview_and_requested_excerpt() {
        let source = BusinessSource::generate(6, Some(11));
        let prompt = source
            .system_instruction(&PromptConfig::default(), "show me the hotel bids")
            .unwrap();
        assert!(prompt.contains("Pipeline value: $"));
        assert!(prompt.contains("HOTEL BIDS"));
        assert!(!prompt.contains("EVENTS (next"));
        assert!(prompt.contains("IMPORTANT IDENTITY"));
    }

    #[test]
    fn added_bid_is_merged_on_refresh() {
        let source = BusinessSource::generate(4, Some(3));
        let before = source.snapshot().bids.len();

        let bid = source.add_bid(&form());
        assert_eq!(bid.bid_id, "BID-NEW-001");
        assert_eq!(source.snapshot().bids.len(), before);

        source.refresh().unwrap();
        let snap = source.snapshot();
        assert_eq!(snap.bids.len(), before + 1);
        assert_eq!(snap.metrics.total_bids_received, before + 1);
        assert!(snap.bids.iter().any(|b| b.bid_id == "BID-NEW-001"));

        assert_eq!(source.add_bid(&form()).bid_id, "BID-NEW-002");
    }

    #[test]
    fn empty_snapshot_is_unavailable() {
        let mut snap = MockDataGenerator::new(Some(1)).generate_snapshot(0);
        snap.bids.clear();
        let source = BusinessSource::from_snapshot(snap);
        assert!(!source.is_available());
        assert!(source.system_instruction(&PromptConfig::default(), "hi").is_err());
    }

    #[test]
    fn dashboard_lists_four_events_with_bid_counts() {
        let source = BusinessSource::generate(8, Some(5));
        let value = source.dashboard_metrics();
        let events = value["events"].as_array().unwrap();
        assert_eq!(events.len(), 4);
        assert!(events[0]["bidCount"].as_u64().unwrap() >= 3);
        assert!(value["metrics"]["totalPipeline"].as_f64().unwrap() > 0.0);
    }
}
