use crate::models::{FilterCriteria, Page, PageButton, Request};
use std::collections::BTreeSet;

pub const DEFAULT_PAGE_SIZE: usize = 10;
const PAGE_WINDOW: usize = 2;

/// Applies every active criterion (ANDed) and orders the result newest first.
pub fn filter_requests<'a, I>(requests: I, criteria: &FilterCriteria) -> Vec<Request>
where
    I: IntoIterator<Item = &'a Request>,
{
    let needle = criteria
        .text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_lowercase);

    let mut matched: Vec<Request> = requests
        .into_iter()
        .filter(|request| matches_criteria(request, criteria, needle.as_deref()))
        .cloned()
        .collect();
    sort_newest_first(&mut matched);
    matched
}

pub fn sort_newest_first(requests: &mut [Request]) {
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

fn matches_criteria(request: &Request, criteria: &FilterCriteria, needle: Option<&str>) -> bool {
    if let Some(status) = criteria.status {
        if request.status != status {
            return false;
        }
    }
    if let Some(authority) = criteria.authority.as_deref() {
        if request.receiving_authority != authority {
            return false;
        }
    }
    if criteria.start_date.is_some() || criteria.end_date.is_some() {
        let Some(submitted) = request.submission_date else {
            return false;
        };
        if criteria.start_date.is_some_and(|start| submitted < start) {
            return false;
        }
        if criteria.end_date.is_some_and(|end| submitted > end) {
            return false;
        }
    }
    match needle {
        Some(needle) => matches_text(request, needle),
        None => true,
    }
}

fn matches_text(request: &Request, needle: &str) -> bool {
    let candidates = [
        Some(request.id.as_str()),
        request.manual_id.as_deref(),
        Some(request.title.as_str()),
        Some(request.details.as_str()),
        Some(request.receiving_authority.as_str()),
    ];
    candidates
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(needle))
}

/// Slices one page out of `items`. Pages are 1-based; out-of-range pages are
/// clamped to the nearest valid page.
pub fn paginate<T>(items: Vec<T>, page: usize, page_size: usize) -> Page<T> {
    let page_size = page_size.max(1);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(page_size).max(1);
    let page = page.clamp(1, total_pages);

    let page_items = items
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .collect();

    Page {
        items: page_items,
        page,
        page_size,
        total_items,
        total_pages,
        buttons: page_buttons(page, total_pages),
    }
}

/// First and last page, the current page and two on either side; each gap
/// collapses into a single ellipsis.
pub fn page_buttons(current: usize, total_pages: usize) -> Vec<PageButton> {
    if total_pages == 0 {
        return Vec::new();
    }
    let current = current.clamp(1, total_pages);

    let mut visible = BTreeSet::new();
    visible.insert(1);
    visible.insert(total_pages);
    let low = current.saturating_sub(PAGE_WINDOW).max(1);
    let high = (current + PAGE_WINDOW).min(total_pages);
    visible.extend(low..=high);

    let mut buttons = Vec::with_capacity(visible.len() + 2);
    let mut previous: Option<usize> = None;
    for number in visible {
        if previous.is_some_and(|previous| number > previous + 1) {
            buttons.push(PageButton::Ellipsis);
        }
        buttons.push(PageButton::Page {
            number,
            current: number == current,
        });
        previous = Some(number);
    }
    buttons
}
