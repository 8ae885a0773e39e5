//! Itinerary data consumed by the dossier layout

use crate::{Error, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub time: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub estimated_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_cost: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActualCosts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accommodation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub food: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayPlan {
    pub day: u32,
    pub theme: String,
    #[serde(default)]
    pub location_base: String,
    #[serde(default)]
    pub accommodation: String,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_costs: Option<ActualCosts>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostBreakdown {
    pub accommodation: f64,
    pub food: f64,
    pub activities: f64,
    pub transport: f64,
    pub total: f64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelSuggestion {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub price_range: String,
    #[serde(default)]
    pub description: String,
}

/// A planned trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Itinerary {
    pub destination_title: String,
    #[serde(default)]
    pub destination_description: String,
    #[serde(default)]
    pub justification: String,
    #[serde(default)]
    pub cost_breakdown: CostBreakdown,
    #[serde(default)]
    pub days: Vec<DayPlan>,
    #[serde(default)]
    pub hotel_suggestions: Vec<HotelSuggestion>,
    /// First day of the trip, `YYYY-MM-DD`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
}

/// Day-level actual cost buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostCategory {
    Accommodation,
    Food,
    Transport,
}

fn amount(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Parse a user-entered amount. Leading numeric text is used, anything
/// unparsable counts as zero.
pub fn parse_amount(input: &str) -> f64 {
    let s = input.trim();
    let end = s
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    // Trim trailing dots or a second decimal point
    let mut candidate = &s[..end];
    while !candidate.is_empty() {
        if let Ok(v) = candidate.parse::<f64>() {
            return v;
        }
        candidate = &candidate[..candidate.len() - 1];
    }
    0.0
}

impl DayPlan {
    pub fn actual_cost(&self, category: CostCategory) -> f64 {
        let costs = match &self.actual_costs {
            Some(c) => c,
            None => return 0.0,
        };
        amount(match category {
            CostCategory::Accommodation => costs.accommodation,
            CostCategory::Food => costs.food,
            CostCategory::Transport => costs.transport,
        })
    }

    pub fn activities_actual(&self) -> f64 {
        self.activities.iter().map(|a| amount(a.actual_cost)).sum()
    }

    pub fn activities_estimated(&self) -> f64 {
        self.activities.iter().map(|a| amount(Some(a.estimated_cost))).sum()
    }

    pub fn actual_total(&self) -> f64 {
        self.actual_cost(CostCategory::Accommodation)
            + self.actual_cost(CostCategory::Food)
            + self.actual_cost(CostCategory::Transport)
            + self.activities_actual()
    }
}

impl Itinerary {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Other(format!("invalid itinerary: {}", e)))
    }

    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    pub fn currency(&self) -> &str {
        &self.cost_breakdown.currency
    }

    pub fn actual_total(&self) -> f64 {
        self.days.iter().map(DayPlan::actual_total).sum()
    }

    pub fn actual_total_for(&self, category: CostCategory) -> f64 {
        self.days.iter().map(|d| d.actual_cost(category)).sum()
    }

    pub fn activities_actual_total(&self) -> f64 {
        self.days.iter().map(DayPlan::activities_actual).sum()
    }

    pub fn planned_total(&self) -> f64 {
        self.cost_breakdown.total
    }

    fn per_day(&self, value: f64) -> f64 {
        if self.days.is_empty() {
            0.0
        } else {
            value / self.days.len() as f64
        }
    }

    pub fn planned_daily_average(&self) -> f64 {
        self.per_day(self.planned_total())
    }

    pub fn actual_daily_average(&self) -> f64 {
        self.per_day(self.actual_total())
    }

    /// Planned spend for one day: its activities plus the per-day share of
    /// accommodation, food and transport.
    pub fn estimated_day_total(&self, day: &DayPlan) -> f64 {
        let b = &self.cost_breakdown;
        day.activities_estimated() + self.per_day(b.accommodation + b.food + b.transport)
    }

    /// Calendar date of trip day `day` (1-based).
    pub fn date_of(&self, day: u32) -> Option<NaiveDate> {
        trip_date(self.start_date?, day)
    }

    pub fn apply(&mut self, edit: ItineraryEdit) -> Result<()> {
        edit.apply_to(self)
    }
}

/// Date of trip day `day` (1-based) for a trip starting on `start`.
pub fn trip_date(start: NaiveDate, day: u32) -> Option<NaiveDate> {
    start.checked_add_signed(Duration::days(day.saturating_sub(1) as i64))
}

/// `dd/mm`
pub fn format_day_month(date: NaiveDate) -> String {
    date.format("%d/%m").to_string()
}

/// Three-letter weekday, `Mon`..`Sun`.
pub fn short_weekday(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

/// A single change to an itinerary. Indices are positions in `days` and
/// `activities`, not day numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ItineraryEdit {
    SetTheme { day: usize, value: String },
    SetLocationBase { day: usize, value: String },
    SetAccommodation { day: usize, value: String },
    SetActualCost { day: usize, category: CostCategory, amount: f64 },
    SetActivityActualCost { day: usize, activity: usize, amount: f64 },
}

impl ItineraryEdit {
    fn apply_to(self, it: &mut Itinerary) -> Result<()> {
        let day_count = it.days.len();
        let idx = match &self {
            ItineraryEdit::SetTheme { day, .. }
            | ItineraryEdit::SetLocationBase { day, .. }
            | ItineraryEdit::SetAccommodation { day, .. }
            | ItineraryEdit::SetActualCost { day, .. }
            | ItineraryEdit::SetActivityActualCost { day, .. } => *day,
        };
        let day = it
            .days
            .get_mut(idx)
            .ok_or_else(|| Error::Other(format!("day index {} out of range ({} days)", idx, day_count)))?;
        match self {
            ItineraryEdit::SetTheme { value, .. } => day.theme = value,
            ItineraryEdit::SetLocationBase { value, .. } => day.location_base = value,
            ItineraryEdit::SetAccommodation { value, .. } => day.accommodation = value,
            ItineraryEdit::SetActualCost { category, amount, .. } => {
                let costs = day.actual_costs.get_or_insert_with(ActualCosts::default);
                let slot = match category {
                    CostCategory::Accommodation => &mut costs.accommodation,
                    CostCategory::Food => &mut costs.food,
                    CostCategory::Transport => &mut costs.transport,
                };
                *slot = Some(amount);
            }
            ItineraryEdit::SetActivityActualCost { activity, amount, .. } => {
                let count = day.activities.len();
                let act = day.activities.get_mut(activity).ok_or_else(|| {
                    Error::Other(format!("activity index {} out of range ({} activities)", activity, count))
                })?;
                act.actual_cost = Some(amount);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn sample_itinerary() -> Itinerary {
    let json = r#"{
        "destinationTitle": "Rio de Janeiro",
        "destinationDescription": "Sun, samba and mountains",
        "justification": "Beaches within a short flight",
        "costBreakdown": {"accommodation": 600, "food": 300, "activities": 200, "transport": 100, "total": 1200, "currency": "BRL"},
        "startDate": "2025-03-30",
        "days": [
            {"day": 1, "theme": "Arrival", "locationBase": "Copacabana", "accommodation": "Hotel Mar",
             "activities": [{"time": "18:00", "title": "Beach walk", "description": "Sunset on the promenade", "location": "Copacabana", "estimatedCost": 0}]},
            {"day": 2, "theme": "City Tour", "locationBase": "Centro", "accommodation": "Hotel Mar",
             "activities": [{"time": "09:00", "title": "Christ the Redeemer", "location": "Corcovado", "estimatedCost": 120, "actualCost": 150}],
             "actualCosts": {"food": 80}}
        ],
        "hotelSuggestions": [{"name": "Hotel Mar", "category": "Mid", "priceRange": "R$300", "description": "Near the beach"}]
    }"#;
    Itinerary::from_json(json).unwrap()
}
