use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use log::{debug, warn};

pub mod bridge;
pub mod config;
pub mod engine;
pub mod error_display;
pub mod filter;
pub mod restore;
pub mod row_cache;
pub mod viewport;

pub use bridge::EngineBridge;
pub use config::{AppConfig, ConfigManager};
pub use error_display::ErrorKind;

use engine::{
    Aggregation, ColumnsPurpose, EngineReply, EngineRequest, GroupingSpec, Mutation, RowValues,
};
use filter::FilterNode;
use row_cache::RowWindowCache;
use viewport::RowWindow;

/// Application name used for the config directory and other app-specific paths
pub const APP_NAME: &str = "tabscope";

/// Which filter editor the user is working in. Exactly one is active at a
/// time; switching with a non-empty filter in the current surface asks for
/// confirmation first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterSurface {
    Quick,
    Advanced,
}

/// The committed filter, at most one across both surfaces.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FilterState {
    #[default]
    None,
    Quick(String),
    Advanced(FilterNode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortState {
    pub column: String,
    pub descending: bool,
}

/// The coordinator's mirror of the engine's working set. Identity and shape
/// fields update only from successful engine replies; the filter field is the
/// user's committed intent and updates as soon as a commit is sent.
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    pub file_path: Option<PathBuf>,
    pub sort: Option<SortState>,
    pub filter: FilterState,
    pub grouping: Option<GroupingSpec>,
    pub row_count: usize,
    pub columns: Vec<String>,
}

/// Dataset lifecycle. Data operations are only served in `Ready`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DatasetPhase {
    #[default]
    Unloaded,
    Loading {
        path: PathBuf,
    },
    Ready,
    Failed,
}

impl DatasetPhase {
    pub fn is_ready(&self) -> bool {
        matches!(self, DatasetPhase::Ready)
    }
}

#[derive(Default)]
pub struct ErrorBanner {
    pub active: bool,
    pub kind: Option<ErrorKind>,
    pub message: String,
}

impl ErrorBanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, kind: ErrorKind, message: String) {
        self.active = true;
        self.kind = Some(kind);
        self.message = message;
    }

    pub fn hide(&mut self) {
        self.active = false;
        self.kind = None;
        self.message.clear();
    }
}

#[derive(Default)]
pub struct NoticeBanner {
    pub active: bool,
    pub message: String,
}

impl NoticeBanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, message: String) {
        self.active = true;
        self.message = message;
    }

    pub fn hide(&mut self) {
        self.active = false;
        self.message.clear();
    }
}

#[derive(Default)]
pub struct ConfirmPrompt {
    pub active: bool,
    pub message: String,
}

impl ConfirmPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, message: String) {
        self.active = true;
        self.message = message;
    }

    pub fn hide(&mut self) {
        self.active = false;
        self.message.clear();
    }
}

/// A quick-filter commit waiting out the debounce window.
struct PendingQuickFilter {
    text: String,
    deadline: Instant,
}

pub enum AppEvent {
    /// Load a dataset, replacing the current one.
    Open(PathBuf),
    /// Ask the engine for a prior session to seed from. Only acted on before
    /// the first load.
    Restore,
    /// A quick-filter keystroke. Commits after the debounce window.
    QuickFilterInput(String),
    /// Commit the quick filter immediately, skipping the debounce.
    QuickFilterApply,
    /// Restrict the quick filter to one column, or all columns with `None`.
    QuickFilterTarget(Option<String>),
    /// Commit an advanced filter tree, or clear with `None`.
    AdvancedFilterApply(Option<FilterNode>),
    /// Clear the active surface's filter.
    FilterClear,
    /// A header click: cycle ascending, descending, unsorted.
    SortClick(String),
    GroupBy(String, Aggregation),
    GroupReset,
    /// Switch to the other filter surface.
    FilterModeToggle(FilterSurface),
    /// Answer to the pending mode-switch confirmation.
    FilterModeConfirm(bool),
    /// The embedding view scrolled or resized.
    Scroll {
        offset_px: u64,
        viewport_height_px: u64,
    },
    DismissError,
    DismissNotice,
    /// A reply from the engine worker.
    Engine(EngineReply),
}

pub struct App {
    requests: Sender<EngineRequest>,
    query: QueryState,
    cache: RowWindowCache,
    phase: DatasetPhase,

    filter_surface: FilterSurface,
    quick_filter_text: String,
    quick_filter_column: Option<String>,
    pending_quick_filter: Option<PendingQuickFilter>,
    debounce: Duration,

    error_banner: ErrorBanner,
    notice_banner: NoticeBanner,
    confirm_prompt: ConfirmPrompt,
    pending_mode_switch: Option<FilterSurface>,

    /// Bumped at every committed mutation; replies carrying an older value
    /// belong to a superseded working set and are dropped.
    query_epoch: u64,

    // In-flight multi-step chains.
    pending_load: Option<(PathBuf, usize)>,
    pending_grouping: Option<GroupingSpec>,
    pending_grouped_columns: Option<Vec<String>>,

    last_scroll: Option<(u64, u64)>,

    row_height_px: u64,
    overscan: usize,
    max_fetch_rows: usize,
}

impl App {
    pub fn new(requests: Sender<EngineRequest>) -> Self {
        Self::with_config(requests, &AppConfig::default())
    }

    pub fn with_config(requests: Sender<EngineRequest>, config: &AppConfig) -> Self {
        Self {
            requests,
            query: QueryState::default(),
            cache: RowWindowCache::new(),
            phase: DatasetPhase::default(),
            filter_surface: FilterSurface::Quick,
            quick_filter_text: String::new(),
            quick_filter_column: None,
            pending_quick_filter: None,
            debounce: Duration::from_millis(config.performance.quick_filter_debounce_ms),
            error_banner: ErrorBanner::new(),
            notice_banner: NoticeBanner::new(),
            confirm_prompt: ConfirmPrompt::new(),
            pending_mode_switch: None,
            query_epoch: 0,
            pending_load: None,
            pending_grouping: None,
            pending_grouped_columns: None,
            last_scroll: None,
            row_height_px: config.display.row_height_estimate_px,
            overscan: config.display.overscan_rows,
            max_fetch_rows: config.performance.max_fetch_rows,
        }
    }

    pub fn state(&self) -> &QueryState {
        &self.query
    }

    pub fn phase(&self) -> &DatasetPhase {
        &self.phase
    }

    pub fn filter_surface(&self) -> FilterSurface {
        self.filter_surface
    }

    pub fn quick_filter_text(&self) -> &str {
        &self.quick_filter_text
    }

    pub fn quick_filter_column(&self) -> Option<&str> {
        self.quick_filter_column.as_deref()
    }

    pub fn error_banner(&self) -> &ErrorBanner {
        &self.error_banner
    }

    pub fn notice_banner(&self) -> &NoticeBanner {
        &self.notice_banner
    }

    pub fn confirm_prompt(&self) -> &ConfirmPrompt {
        &self.confirm_prompt
    }

    /// Row for display, if cached. A `None` is the placeholder case.
    pub fn row(&self, index: usize) -> Option<&RowValues> {
        self.cache.lookup(index)
    }

    pub fn cached_rows(&self) -> usize {
        self.cache.cached_len()
    }

    /// Drive time-based work: commits the quick filter once its debounce
    /// window has passed. The embedding loop calls this on its tick.
    pub fn tick(&mut self, now: Instant) {
        let due = self
            .pending_quick_filter
            .as_ref()
            .is_some_and(|p| now >= p.deadline);
        if due {
            if let Some(pending) = self.pending_quick_filter.take() {
                self.commit_quick_filter(pending.text);
            }
        }
    }

    /// Process one event. May return a follow-up event for the embedding
    /// loop, in the manner of chained deferred work.
    pub fn event(&mut self, event: &AppEvent) -> Option<AppEvent> {
        match event {
            AppEvent::Open(path) => self.open(path.clone()),
            AppEvent::Restore => {
                if self.phase == DatasetPhase::Unloaded {
                    self.send_request(EngineRequest::Snapshot);
                }
                None
            }
            AppEvent::QuickFilterInput(text) => {
                self.quick_filter_input_at(text.clone(), Instant::now());
                None
            }
            AppEvent::QuickFilterApply => {
                if self.phase.is_ready() && self.filter_surface == FilterSurface::Quick {
                    self.pending_quick_filter = None;
                    self.commit_quick_filter(self.quick_filter_text.clone());
                }
                None
            }
            AppEvent::QuickFilterTarget(column) => {
                self.quick_filter_target_at(column.clone(), Instant::now());
                None
            }
            AppEvent::AdvancedFilterApply(tree) => {
                self.advanced_filter_apply(tree.as_ref());
                None
            }
            AppEvent::FilterClear => {
                self.filter_clear();
                None
            }
            AppEvent::SortClick(column) => {
                self.sort_click(column);
                None
            }
            AppEvent::GroupBy(column, aggregation) => {
                if self.phase.is_ready() {
                    let epoch = self.bump_epoch();
                    self.send_request(EngineRequest::GroupBy {
                        column: column.clone(),
                        aggregation: *aggregation,
                        epoch,
                    });
                }
                None
            }
            AppEvent::GroupReset => {
                if self.phase.is_ready() && self.query.grouping.is_some() {
                    let epoch = self.bump_epoch();
                    self.send_request(EngineRequest::Mutate {
                        mutation: Mutation::ResetGrouping,
                        epoch,
                    });
                }
                None
            }
            AppEvent::FilterModeToggle(target) => {
                self.filter_mode_toggle(*target);
                None
            }
            AppEvent::FilterModeConfirm(confirmed) => {
                self.filter_mode_confirm(*confirmed);
                None
            }
            AppEvent::Scroll {
                offset_px,
                viewport_height_px,
            } => {
                if self.phase.is_ready() {
                    self.last_scroll = Some((*offset_px, *viewport_height_px));
                    self.ensure_window();
                }
                None
            }
            AppEvent::DismissError => {
                // Load failures stay up until a successful load replaces them.
                if !self.error_banner.kind.is_some_and(|k| k.is_blocking()) {
                    self.error_banner.hide();
                }
                None
            }
            AppEvent::DismissNotice => {
                self.notice_banner.hide();
                None
            }
            AppEvent::Engine(reply) => self.engine_reply(reply),
        }
    }

    /// Quick-filter keystroke with an explicit clock, for deterministic
    /// debounce tests. Re-arms the debounce window on every call.
    pub fn quick_filter_input_at(&mut self, text: String, now: Instant) {
        if !self.phase.is_ready() || self.filter_surface != FilterSurface::Quick {
            return;
        }
        self.quick_filter_text = text.clone();
        self.pending_quick_filter = Some(PendingQuickFilter {
            text,
            deadline: now + self.debounce,
        });
    }

    /// Change the quick-filter target column. An armed or committed filter
    /// re-commits against the new target after the debounce window.
    pub fn quick_filter_target_at(&mut self, column: Option<String>, now: Instant) {
        if !self.phase.is_ready() || self.filter_surface != FilterSurface::Quick {
            return;
        }
        self.quick_filter_column = column;
        if !self.quick_filter_text.is_empty() {
            self.pending_quick_filter = Some(PendingQuickFilter {
                text: self.quick_filter_text.clone(),
                deadline: now + self.debounce,
            });
        }
    }

    fn open(&mut self, path: PathBuf) -> Option<AppEvent> {
        self.pending_quick_filter = None;
        self.pending_grouping = None;
        self.pending_grouped_columns = None;
        self.pending_mode_switch = None;
        self.confirm_prompt.hide();
        self.notice_banner.hide();
        self.phase = DatasetPhase::Loading { path: path.clone() };
        self.send_request(EngineRequest::Load(path));
        None
    }

    fn commit_quick_filter(&mut self, text: String) {
        self.query.filter = if text.is_empty() {
            FilterState::None
        } else {
            FilterState::Quick(text.clone())
        };
        let epoch = self.bump_epoch();
        self.send_request(EngineRequest::Mutate {
            mutation: Mutation::QuickFilter {
                column: self.quick_filter_column.clone(),
                query: text,
            },
            epoch,
        });
    }

    fn advanced_filter_apply(&mut self, tree: Option<&FilterNode>) {
        if !self.phase.is_ready() || self.filter_surface != FilterSurface::Advanced {
            return;
        }
        match tree {
            Some(tree) => {
                self.query.filter = FilterState::Advanced(tree.clone());
                let epoch = self.bump_epoch();
                self.send_request(EngineRequest::Mutate {
                    mutation: Mutation::AdvancedFilter { tree: tree.clone() },
                    epoch,
                });
            }
            None => self.commit_filter_clear(),
        }
    }

    fn filter_clear(&mut self) {
        if !self.phase.is_ready() {
            return;
        }
        self.pending_quick_filter = None;
        self.quick_filter_text.clear();
        self.commit_filter_clear();
    }

    /// An empty quick filter is the engine's clear operation, whichever
    /// surface the cleared filter came from.
    fn commit_filter_clear(&mut self) {
        self.query.filter = FilterState::None;
        let epoch = self.bump_epoch();
        self.send_request(EngineRequest::Mutate {
            mutation: Mutation::QuickFilter {
                column: None,
                query: String::new(),
            },
            epoch,
        });
    }

    fn sort_click(&mut self, column: &str) {
        if !self.phase.is_ready() {
            return;
        }
        let next = match &self.query.sort {
            Some(sort) if sort.column == column && !sort.descending => Some(true),
            Some(sort) if sort.column == column && sort.descending => None,
            _ => Some(false),
        };
        let epoch = self.bump_epoch();
        self.send_request(EngineRequest::Mutate {
            mutation: Mutation::Sort {
                column: next.map(|_| column.to_string()),
                descending: next.unwrap_or(false),
            },
            epoch,
        });
    }

    fn filter_mode_toggle(&mut self, target: FilterSurface) {
        if !self.phase.is_ready() || target == self.filter_surface || self.confirm_prompt.active {
            return;
        }
        let source_dirty = match self.filter_surface {
            FilterSurface::Quick => {
                !self.quick_filter_text.is_empty()
                    || matches!(self.query.filter, FilterState::Quick(_))
            }
            FilterSurface::Advanced => matches!(self.query.filter, FilterState::Advanced(_)),
        };
        if source_dirty {
            let source = match self.filter_surface {
                FilterSurface::Quick => "quick filter",
                FilterSurface::Advanced => "advanced filter",
            };
            self.pending_mode_switch = Some(target);
            self.confirm_prompt.show(format!(
                "Switching filter modes clears the current {}. Continue?",
                source
            ));
        } else {
            self.filter_surface = target;
        }
    }

    fn filter_mode_confirm(&mut self, confirmed: bool) {
        self.confirm_prompt.hide();
        let Some(target) = self.pending_mode_switch.take() else {
            return;
        };
        if !confirmed {
            return;
        }
        self.pending_quick_filter = None;
        self.quick_filter_text.clear();
        self.filter_surface = target;
        self.notice_banner.show("Filter cleared".to_string());
        // The remote working set still reflects the old filter; clear it so
        // the visible rows match the now-empty filter state.
        self.commit_filter_clear();
    }

    fn engine_reply(&mut self, reply: &EngineReply) -> Option<AppEvent> {
        match reply {
            EngineReply::Loaded { path, result } => self.on_loaded(path, result),
            EngineReply::Columns {
                purpose,
                epoch,
                result,
            } => self.on_columns(*purpose, *epoch, result),
            EngineReply::RowCount { epoch, result } => self.on_row_count(*epoch, result),
            EngineReply::Rows {
                start,
                limit,
                generation,
                result,
            } => {
                match result {
                    Ok(rows) => {
                        self.cache
                            .on_fetch_complete(*start, *limit, rows.clone(), *generation)
                    }
                    Err(message) => {
                        warn!("row fetch {}..{} failed: {}", start, start + limit, message);
                        self.cache.on_fetch_failed(*start, *limit, *generation);
                    }
                }
                None
            }
            EngineReply::MutationApplied {
                mutation,
                epoch,
                result,
            } => self.on_mutation_applied(mutation, *epoch, result),
            EngineReply::Grouped {
                spec,
                epoch,
                result,
            } => {
                if *epoch != self.query_epoch {
                    return None;
                }
                match result {
                    Ok(()) => {
                        // Columns changed shape; fetch them, then the count,
                        // before publishing anything.
                        self.pending_grouping = Some(spec.clone());
                        self.send_request(EngineRequest::Columns {
                            purpose: ColumnsPurpose::AfterGrouping,
                            epoch: *epoch,
                        });
                    }
                    Err(message) => {
                        self.error_banner.show(ErrorKind::Query, message.clone());
                    }
                }
                None
            }
            EngineReply::Snapshot { result } => {
                if self.phase != DatasetPhase::Unloaded {
                    return None;
                }
                match result {
                    Ok(Some(snapshot)) => {
                        restore::apply_snapshot(&mut self.query, snapshot);
                        self.cache.invalidate_all();
                        self.phase = DatasetPhase::Ready;
                    }
                    Ok(None) => {}
                    Err(message) => {
                        // A failed restore is the same as no prior session.
                        debug!("session restore failed: {}", message);
                    }
                }
                None
            }
        }
    }

    fn on_loaded(&mut self, path: &std::path::Path, result: &Result<usize, String>) -> Option<AppEvent> {
        if !matches!(&self.phase, DatasetPhase::Loading { path: p } if p == path) {
            return None;
        }
        match result {
            Ok(row_count) => {
                self.pending_load = Some((path.to_path_buf(), *row_count));
                self.send_request(EngineRequest::Columns {
                    purpose: ColumnsPurpose::AfterLoad,
                    epoch: self.query_epoch,
                });
            }
            Err(message) => {
                self.phase = DatasetPhase::Failed;
                self.error_banner.show(ErrorKind::Load, message.clone());
            }
        }
        None
    }

    fn on_columns(
        &mut self,
        purpose: ColumnsPurpose,
        epoch: u64,
        result: &Result<Vec<String>, String>,
    ) -> Option<AppEvent> {
        match purpose {
            ColumnsPurpose::AfterLoad => {
                let Some((path, row_count)) = self.pending_load.take() else {
                    return None;
                };
                match result {
                    Ok(columns) => {
                        self.query = QueryState {
                            file_path: Some(path),
                            sort: None,
                            filter: FilterState::None,
                            grouping: None,
                            row_count,
                            columns: columns.clone(),
                        };
                        self.filter_surface = FilterSurface::Quick;
                        self.quick_filter_text.clear();
                        self.quick_filter_column = None;
                        self.bump_epoch();
                        self.cache.invalidate_all();
                        self.last_scroll = None;
                        self.phase = DatasetPhase::Ready;
                        self.error_banner.hide();
                    }
                    Err(message) => {
                        self.phase = DatasetPhase::Failed;
                        self.error_banner.show(ErrorKind::Load, message.clone());
                    }
                }
            }
            ColumnsPurpose::AfterGrouping => {
                if epoch != self.query_epoch {
                    self.pending_grouping = None;
                    return None;
                }
                match result {
                    Ok(columns) => {
                        self.pending_grouped_columns = Some(columns.clone());
                        self.send_request(EngineRequest::RowCount { epoch });
                    }
                    Err(message) => {
                        self.pending_grouping = None;
                        self.error_banner.show(ErrorKind::Query, message.clone());
                    }
                }
            }
            ColumnsPurpose::AfterGroupingReset => {
                if epoch != self.query_epoch {
                    return None;
                }
                match result {
                    Ok(columns) => {
                        self.query.columns = columns.clone();
                        self.refresh_view();
                    }
                    Err(message) => {
                        self.error_banner.show(ErrorKind::Query, message.clone());
                    }
                }
            }
        }
        None
    }

    fn on_row_count(&mut self, epoch: u64, result: &Result<usize, String>) -> Option<AppEvent> {
        if epoch != self.query_epoch {
            self.pending_grouping = None;
            self.pending_grouped_columns = None;
            return None;
        }
        let (Some(spec), Some(columns)) = (
            self.pending_grouping.take(),
            self.pending_grouped_columns.take(),
        ) else {
            return None;
        };
        match result {
            Ok(row_count) => {
                self.query.grouping = Some(spec);
                self.query.columns = columns;
                self.query.row_count = *row_count;
                self.refresh_view();
            }
            Err(message) => {
                self.error_banner.show(ErrorKind::Query, message.clone());
            }
        }
        None
    }

    fn on_mutation_applied(
        &mut self,
        mutation: &Mutation,
        epoch: u64,
        result: &Result<usize, String>,
    ) -> Option<AppEvent> {
        if epoch != self.query_epoch {
            return None;
        }
        match result {
            Ok(row_count) => {
                let grouping_was_active = self.query.grouping.is_some();
                match mutation {
                    Mutation::Sort { column, descending } => {
                        self.query.sort = column.as_ref().map(|c| SortState {
                            column: c.clone(),
                            descending: *descending,
                        });
                    }
                    // Filters rebuild the working set from the original
                    // rows, which drops any grouping on the engine side.
                    Mutation::QuickFilter { .. } | Mutation::AdvancedFilter { .. } => {
                        self.query.grouping = None;
                    }
                    Mutation::ResetGrouping => {
                        self.query.grouping = None;
                    }
                }
                self.query.row_count = *row_count;
                if grouping_was_active && self.query.grouping.is_none() {
                    // Back to row-level columns; refresh them before the view.
                    self.send_request(EngineRequest::Columns {
                        purpose: ColumnsPurpose::AfterGroupingReset,
                        epoch,
                    });
                    self.cache.invalidate_all();
                } else {
                    self.refresh_view();
                }
            }
            Err(message) => {
                self.error_banner.show(ErrorKind::Query, message.clone());
            }
        }
        None
    }

    /// Invalidate cached rows and refetch the current viewport.
    fn refresh_view(&mut self) {
        self.cache.invalidate_all();
        self.ensure_window();
    }

    fn ensure_window(&mut self) {
        let Some((offset_px, viewport_height_px)) = self.last_scroll else {
            return;
        };
        let mut window = viewport::compute(
            offset_px,
            viewport_height_px,
            self.query.row_count,
            self.row_height_px,
            self.overscan,
        );
        if window.len() > self.max_fetch_rows {
            window = RowWindow {
                start: window.start,
                end: window.start + self.max_fetch_rows,
                total_height_px: window.total_height_px,
            };
        }
        if let Some(ticket) = self.cache.ensure_range(&window) {
            self.send_request(EngineRequest::Rows {
                start: ticket.start,
                limit: ticket.limit,
                generation: ticket.generation,
            });
        }
    }

    fn bump_epoch(&mut self) -> u64 {
        self.query_epoch += 1;
        self.query_epoch
    }

    fn send_request(&mut self, request: EngineRequest) {
        if self.requests.send(request).is_err() {
            warn!("engine worker is gone; request dropped");
        }
    }
}
