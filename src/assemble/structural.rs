//! Dossier pages drawn directly from itinerary data

use super::pdf::{text_width_mm, truncate_to_width, wrap_to_width, Font, PageCanvas};
use crate::itinerary::{format_day_month, short_weekday, CostCategory, DayPlan, Itinerary};
use crate::paginate::PageGeometry;
use crate::rendering::color::Rgba;
use chrono::NaiveDateTime;

const INK: Rgba = Rgba(17, 24, 39, 255);
const MUTED: Rgba = Rgba(107, 114, 128, 255);
const TEAL: Rgba = Rgba(17, 94, 89, 255);
const RULE: Rgba = Rgba(209, 213, 219, 255);
const HEADER_FILL: Rgba = Rgba(229, 231, 235, 255);
const STRIPE_FILL: Rgba = Rgba(249, 250, 251, 255);
const PANEL_FILL: Rgba = Rgba(243, 244, 246, 255);
const STAMP: Rgba = Rgba(185, 28, 28, 255);

const SIDE_MM: f32 = 20.0;

/// Everything the cover needs besides the itinerary.
#[derive(Debug, Clone)]
pub struct CoverInfo<'a> {
    pub brand: &'a str,
    pub subject: &'a str,
    pub generated_at: NaiveDateTime,
}

/// Amounts are shown whole when they are whole, otherwise with cents.
pub fn format_amount(value: f64) -> String {
    if (value - value.round()).abs() < 0.005 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

/// Vertical cursor inside the content band.
struct Flow {
    y: f32,
    bottom: f32,
}

impl Flow {
    fn new(geometry: &PageGeometry) -> Self {
        Self {
            y: geometry.top_margin_mm() as f32 + 8.0,
            bottom: (geometry.height_mm() - geometry.bottom_margin_mm()) as f32,
        }
    }

    fn fits(&self, height: f32) -> bool {
        self.y + height <= self.bottom
    }

    fn advance(&mut self, by: f32) {
        self.y += by;
    }
}

fn line_height_mm(size_pt: f32) -> f32 {
    size_pt * 1.3 * 25.4 / 72.0
}

fn paragraph(canvas: &mut PageCanvas, flow: &mut Flow, x: f32, width: f32, size: f32, color: Rgba, text: &str) -> bool {
    let lh = line_height_mm(size);
    for line in wrap_to_width(text, width, size) {
        if !flow.fits(lh) {
            return false;
        }
        flow.advance(lh);
        canvas.text(x, flow.y, size, Font::Regular, color, &line);
    }
    true
}

pub fn draw_cover(canvas: &mut PageCanvas, itinerary: &Itinerary, info: &CoverInfo<'_>, geometry: &PageGeometry) {
    let w = canvas.width_mm();
    let h = canvas.height_mm();
    let top = geometry.top_margin_mm() as f32;
    let bottom = h - geometry.bottom_margin_mm() as f32;
    let cx = w / 2.0;

    canvas.fill_rect(SIDE_MM, top + 5.0, w - 2.0 * SIDE_MM, bottom - top - 10.0, PANEL_FILL);
    canvas.stroke_rect(SIDE_MM, top + 5.0, w - 2.0 * SIDE_MM, bottom - top - 10.0, 1.0, INK);

    canvas.stroke_rect(w - 75.0, top + 15.0, 45.0, 12.0, 0.8, STAMP);
    canvas.text_centered(w - 52.5, top + 23.5, 14.0, Font::Bold, STAMP, "TOP SECRET");

    canvas.text_centered(cx, 95.0, 30.0, Font::Bold, INK, &info.brand.to_uppercase());
    canvas.line(40.0, 101.0, w - 40.0, 101.0, 1.5, INK);

    let rows = [
        ("AGENT:", info.subject.to_uppercase()),
        ("MISSION:", itinerary.destination_title.to_uppercase()),
        ("DATE:", info.generated_at.format("%d/%m/%Y").to_string()),
    ];
    let mut y = 120.0;
    for (label, value) in rows.iter() {
        canvas.text(40.0, y, 12.0, Font::Bold, INK, label);
        let value = truncate_to_width(value, w - 80.0 - text_width_mm(label, 12.0) - 5.0, 12.0);
        canvas.text_right(w - 40.0, y, 12.0, Font::Regular, INK, &value);
        canvas.line(40.0, y + 2.0, w - 40.0, y + 2.0, 0.2, MUTED);
        y += 11.0;
    }

    let box_top = 175.0;
    canvas.stroke_rect(45.0, box_top, w - 90.0, 40.0, 0.6, INK);
    canvas.text_centered(cx, box_top + 8.0, 9.0, Font::Bold, INK, "CONFIDENTIALITY NOTICE");
    let notice = "This document contains sensitive operational information. \
                  Unauthorized disclosure may result in permanent loss of escape privileges. \
                  After reading, enjoy the trip.";
    let mut ny = box_top + 14.0;
    for line in wrap_to_width(notice, w - 100.0, 8.0) {
        canvas.text(50.0, ny, 8.0, Font::Regular, INK, &line);
        ny += line_height_mm(8.0);
    }

    let mark = format!("GENERATED BY {}", info.brand.to_uppercase());
    canvas.text_centered(cx, bottom - 12.0, 7.0, Font::Regular, MUTED, &mark);
}

pub fn draw_summary(canvas: &mut PageCanvas, itinerary: &Itinerary, geometry: &PageGeometry) {
    let w = canvas.width_mm();
    let width = w - 2.0 * SIDE_MM;
    let mut flow = Flow::new(geometry);

    flow.advance(6.0);
    canvas.text(SIDE_MM, flow.y, 20.0, Font::Bold, TEAL, &truncate_to_width(&itinerary.destination_title, width, 20.0));
    flow.advance(2.0);
    paragraph(canvas, &mut flow, SIDE_MM, width, 11.0, MUTED, &itinerary.destination_description);

    if !itinerary.justification.is_empty() {
        flow.advance(8.0);
        canvas.text(SIDE_MM + 4.0, flow.y, 10.0, Font::Bold, INK, "Why this destination?");
        let start = flow.y - 4.0;
        paragraph(canvas, &mut flow, SIDE_MM + 4.0, width - 4.0, 9.0, INK, &itinerary.justification);
        canvas.fill_rect(SIDE_MM, start, 1.2, flow.y - start + 2.0, TEAL);
    }

    flow.advance(14.0);
    canvas.text(SIDE_MM, flow.y, 13.0, Font::Bold, INK, "Mission schedule");
    flow.advance(2.0);
    canvas.line(SIDE_MM, flow.y, w - SIDE_MM, flow.y, 0.4, RULE);
    flow.advance(4.0);

    let days = &itinerary.days;
    let (groups, rows_per_group, row_h) = schedule_grid(days.len(), flow.bottom - flow.y);
    if groups > 1 {
        log::debug!("schedule table split into {} column groups of {} days", groups, rows_per_group);
    }
    let size = (row_h * 1.125).min(9.0);
    let baseline = row_h * 0.69;
    let group_w = (width - GROUP_GAP_MM * (groups - 1) as f32) / groups as f32;
    let headers = ["Day", "Date", "Theme", "Base"];

    for group in 0..groups {
        let x0 = SIDE_MM + group as f32 * (group_w + GROUP_GAP_MM);
        let widths = SCHEDULE_COLUMNS.map(|f| f * group_w);
        let mut cols = [x0; 4];
        for i in 1..cols.len() {
            cols[i] = cols[i - 1] + widths[i - 1];
        }
        let pad = (group_w * 0.02).min(2.0);
        let mut y = flow.y;

        canvas.fill_rect(x0, y, group_w, row_h, HEADER_FILL);
        for (i, head) in headers.iter().enumerate() {
            let text = truncate_to_width(head, widths[i] - 2.0 * pad, size);
            canvas.text(cols[i] + pad, y + baseline, size, Font::Bold, INK, &text);
        }
        y += row_h;

        for (row, day) in days.iter().skip(group * rows_per_group).take(rows_per_group).enumerate() {
            if row % 2 == 1 {
                canvas.fill_rect(x0, y, group_w, row_h, STRIPE_FILL);
            }
            let date = itinerary.date_of(day.day).map(format_day_month).unwrap_or_default();
            canvas.text(cols[0] + pad, y + baseline, size, Font::Bold, INK, &day.day.to_string());
            let cells = [date, day.theme.clone(), day.location_base.clone()];
            for (i, cell) in cells.iter().enumerate() {
                let text = truncate_to_width(cell, widths[i + 1] - 2.0 * pad, size);
                canvas.text(cols[i + 1] + pad, y + baseline, size, Font::Regular, INK, &text);
            }
            canvas.line(x0, y + row_h, x0 + group_w, y + row_h, 0.2, RULE);
            y += row_h;
        }
    }
}

/// Share of a column group's width taken by Day, Date, Theme and Base.
const SCHEDULE_COLUMNS: [f32; 4] = [14.0 / 170.0, 22.0 / 170.0, 74.0 / 170.0, 60.0 / 170.0];
const GROUP_GAP_MM: f32 = 4.0;
const MIN_ROW_MM: f32 = 4.0;
const MAX_ROW_MM: f32 = 8.0;

/// Column groups, rows per group and row height for a schedule of
/// `entries` days in `available_mm` of height. Each group repeats the
/// header row. Rows shrink down to `MIN_ROW_MM` before the table splits.
fn schedule_grid(entries: usize, available_mm: f32) -> (usize, usize, f32) {
    let entries = entries.max(1);
    let available_mm = available_mm.max(0.0);
    let single = available_mm / (entries + 1) as f32;
    if single >= MIN_ROW_MM {
        return (1, entries, single.min(MAX_ROW_MM));
    }
    let rows = ((available_mm / MIN_ROW_MM).floor() as usize).saturating_sub(1).max(1);
    (entries.div_ceil(rows), rows, MIN_ROW_MM)
}

pub fn draw_day(canvas: &mut PageCanvas, itinerary: &Itinerary, day: &DayPlan, geometry: &PageGeometry) {
    let w = canvas.width_mm();
    let width = w - 2.0 * SIDE_MM;
    let mut flow = Flow::new(geometry);
    let currency = itinerary.currency();

    flow.advance(10.0);
    canvas.text(SIDE_MM, flow.y, 28.0, Font::Bold, TEAL, &format!("DAY {}", day.day));
    canvas.text_right(w - SIDE_MM, flow.y - 7.0, 8.0, Font::Bold, MUTED, "THEME");
    canvas.text_right(
        w - SIDE_MM,
        flow.y,
        13.0,
        Font::Bold,
        INK,
        &truncate_to_width(&day.theme, width / 2.0, 13.0),
    );
    if let Some(date) = itinerary.date_of(day.day) {
        flow.advance(7.0);
        let label = format!("{} - {}", short_weekday(date).to_uppercase(), format_day_month(date));
        canvas.text(SIDE_MM, flow.y, 12.0, Font::Regular, MUTED, &label);
    }
    flow.advance(4.0);
    canvas.line(SIDE_MM, flow.y, w - SIDE_MM, flow.y, 1.2, TEAL);

    flow.advance(6.0);
    canvas.fill_rect(SIDE_MM, flow.y, width, 16.0, PANEL_FILL);
    canvas.text(SIDE_MM + 4.0, flow.y + 5.5, 7.5, Font::Bold, MUTED, "BASE");
    canvas.text(SIDE_MM + 4.0, flow.y + 11.5, 10.0, Font::Bold, INK, &truncate_to_width(&day.location_base, width / 2.0 - 8.0, 10.0));
    let half = SIDE_MM + width / 2.0;
    canvas.text(half + 4.0, flow.y + 5.5, 7.5, Font::Bold, MUTED, "ACCOMMODATION");
    canvas.text(half + 4.0, flow.y + 11.5, 10.0, Font::Bold, INK, &truncate_to_width(&day.accommodation, width / 2.0 - 8.0, 10.0));
    flow.advance(16.0);

    flow.advance(10.0);
    canvas.text(SIDE_MM, flow.y, 12.0, Font::Bold, INK, "Main activities");
    flow.advance(2.0);
    canvas.line(SIDE_MM, flow.y, w - SIDE_MM, flow.y, 0.3, RULE);

    let text_x = SIDE_MM + 16.0;
    let text_w = width - 16.0;
    for (i, act) in day.activities.iter().enumerate() {
        let title_h = line_height_mm(10.0);
        if !flow.fits(title_h + 10.0) {
            log::warn!("day {} truncated after {} activities", day.day, i);
            break;
        }
        flow.advance(4.0 + title_h);
        canvas.text(SIDE_MM, flow.y, 10.0, Font::Bold, TEAL, &act.time);
        canvas.text(text_x, flow.y, 10.0, Font::Bold, INK, &truncate_to_width(&act.title, text_w, 10.0));
        if !paragraph(canvas, &mut flow, text_x, text_w, 8.5, MUTED, &act.description) {
            break;
        }
        let mut meta = format!(
            "Location: {}    Estimated: {} {}",
            act.location,
            format_amount(act.estimated_cost),
            currency
        );
        if let Some(actual) = act.actual_cost {
            meta.push_str(&format!("    Actual: {} {}", format_amount(actual), currency));
        }
        if !flow.fits(line_height_mm(7.5)) {
            break;
        }
        flow.advance(line_height_mm(7.5));
        canvas.text(text_x, flow.y, 7.5, Font::Regular, MUTED, &truncate_to_width(&meta, text_w, 7.5));
        flow.advance(2.0);
        canvas.line(text_x, flow.y, w - SIDE_MM, flow.y, 0.15, RULE);
    }
}

pub fn draw_closing(canvas: &mut PageCanvas, itinerary: &Itinerary, geometry: &PageGeometry) {
    let w = canvas.width_mm();
    let width = w - 2.0 * SIDE_MM;
    let mut flow = Flow::new(geometry);
    let currency = itinerary.currency();
    let b = &itinerary.cost_breakdown;

    flow.advance(8.0);
    canvas.text(SIDE_MM, flow.y, 22.0, Font::Bold, INK, "Financial report");
    flow.advance(3.0);
    canvas.line(SIDE_MM, flow.y, w - SIDE_MM, flow.y, 1.2, TEAL);

    flow.advance(14.0);
    canvas.text(SIDE_MM, flow.y, 11.0, Font::Bold, MUTED, "Planned total");
    flow.advance(12.0);
    canvas.text(
        SIDE_MM,
        flow.y,
        28.0,
        Font::Bold,
        TEAL,
        &format!("{} {}", format_amount(itinerary.planned_total().round()), currency),
    );

    flow.advance(14.0);
    let cols = [SIDE_MM + 2.0, SIDE_MM + width * 0.55, SIDE_MM + width - 2.0];
    canvas.fill_rect(SIDE_MM, flow.y, width, 8.0, HEADER_FILL);
    canvas.text(cols[0], flow.y + 5.5, 9.0, Font::Bold, INK, "Category");
    canvas.text_right(cols[1], flow.y + 5.5, 9.0, Font::Bold, INK, "Planned");
    canvas.text_right(cols[2], flow.y + 5.5, 9.0, Font::Bold, INK, "Actual");
    flow.advance(8.0);

    let rows = [
        ("Accommodation", b.accommodation, itinerary.actual_total_for(CostCategory::Accommodation)),
        ("Food", b.food, itinerary.actual_total_for(CostCategory::Food)),
        ("Transport", b.transport, itinerary.actual_total_for(CostCategory::Transport)),
        ("Activities", b.activities, itinerary.activities_actual_total()),
    ];
    for (i, (label, planned, actual)) in rows.iter().enumerate() {
        if i % 2 == 1 {
            canvas.fill_rect(SIDE_MM, flow.y, width, 8.0, STRIPE_FILL);
        }
        canvas.text(cols[0], flow.y + 5.5, 9.0, Font::Regular, INK, label);
        canvas.text_right(cols[1], flow.y + 5.5, 9.0, Font::Regular, INK, &format_amount(*planned));
        canvas.text_right(cols[2], flow.y + 5.5, 9.0, Font::Regular, INK, &format_amount(*actual));
        flow.advance(8.0);
    }
    canvas.line(SIDE_MM, flow.y, w - SIDE_MM, flow.y, 0.5, INK);
    let summary = [
        ("Total", itinerary.planned_total(), itinerary.actual_total()),
        ("Daily average", itinerary.planned_daily_average(), itinerary.actual_daily_average()),
    ];
    for (label, planned, actual) in summary {
        canvas.text(cols[0], flow.y + 5.5, 9.0, Font::Bold, INK, label);
        canvas.text_right(cols[1], flow.y + 5.5, 9.0, Font::Bold, INK, &format_amount(planned));
        canvas.text_right(cols[2], flow.y + 5.5, 9.0, Font::Bold, INK, &format_amount(actual));
        flow.advance(8.0);
    }
    flow.advance(4.0);
    canvas.text(SIDE_MM, flow.y, 8.0, Font::Regular, MUTED, &format!("All amounts in {}", currency));

    if !itinerary.hotel_suggestions.is_empty() {
        flow.advance(14.0);
        canvas.text(SIDE_MM, flow.y, 12.0, Font::Bold, INK, "Accommodation suggestions");
        for hotel in &itinerary.hotel_suggestions {
            if !flow.fits(16.0) {
                break;
            }
            flow.advance(8.0);
            canvas.text(SIDE_MM, flow.y, 10.0, Font::Bold, INK, &truncate_to_width(&hotel.name, width * 0.7, 10.0));
            canvas.text_right(w - SIDE_MM, flow.y, 9.0, Font::Bold, TEAL, &hotel.price_range);
            flow.advance(line_height_mm(8.5));
            let line = if hotel.category.is_empty() {
                hotel.description.clone()
            } else {
                format!("{} - {}", hotel.category, hotel.description)
            };
            canvas.text(SIDE_MM, flow.y, 8.5, Font::Regular, MUTED, &truncate_to_width(&line, width, 8.5));
        }
    }

    let bottom = (geometry.height_mm() - geometry.bottom_margin_mm()) as f32;
    canvas.text_centered(w / 2.0, bottom - 6.0, 9.0, Font::Regular, MUTED, "End of dossier. Have a good trip, agent.");
}
