use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::fuzzy;
use crate::models::{
    BucketEntry, ObjectEntry, SortMode, parent_prefix, sort_buckets, sort_objects,
};
use crate::ops::{OpOutcome, Operation, Refresh};
use crate::picker::FilePicker;
use crate::session::Session;
use crate::storage::{ListPage, StorageService};

/// Start fetching the next page once the cursor is this close to the end of
/// the loaded list.
const LOAD_MORE_THRESHOLD: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewMode {
    Buckets,
    Objects,
}

/// At most one overlay owns the keyboard at a time.
pub enum Modal {
    None,
    ConfirmDelete { keys: Vec<String> },
    TextInput { kind: InputKind, buffer: String },
    Help,
    Error(String),
    FilePicker(FilePicker),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    Upload,
    Download,
    NewFolder,
    NewBucket,
}

impl InputKind {
    pub fn title(self) -> &'static str {
        match self {
            InputKind::Upload => "Upload file (local path)",
            InputKind::Download => "Download to (path, ~/ expands)",
            InputKind::NewFolder => "New folder name",
            InputKind::NewBucket => "New bucket name",
        }
    }
}

/// Effectful requests the dispatcher hands back to the event loop; all
/// other key handling mutates [`App`] directly.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Quit,
    LoadBuckets,
    LoadObjects {
        bucket: String,
        prefix: String,
        append: bool,
    },
    Operate(Operation),
}

/// An in-flight listing, tagged with the target it was issued for so a
/// completion that no longer matches the current view can be discarded.
pub enum ListTask {
    Buckets {
        handle: JoinHandle<Result<Vec<BucketEntry>>>,
    },
    Objects {
        bucket: String,
        prefix: String,
        append: bool,
        handle: JoinHandle<Result<ListPage>>,
    },
}

impl ListTask {
    pub fn is_finished(&self) -> bool {
        match self {
            ListTask::Buckets { handle } => handle.is_finished(),
            ListTask::Objects { handle, .. } => handle.is_finished(),
        }
    }

    pub fn abort(&self) {
        match self {
            ListTask::Buckets { handle } => handle.abort(),
            ListTask::Objects { handle, .. } => handle.abort(),
        }
    }
}

pub struct StatusLine {
    pub text: String,
    pub error: bool,
    pub expires_at: Instant,
}

/// The whole application state, owned and mutated only by the event-loop
/// thread; the visible (sorted, filtered) lists are derived on demand.
pub struct App {
    pub config: Config,
    pub gateway: Option<StorageService>,
    pub session: Session,

    pub view: ViewMode,
    pub buckets: Vec<BucketEntry>,
    pub objects: Vec<ObjectEntry>,
    pub bucket: Option<String>,
    pub prefix: String,
    pub sort: SortMode,
    pub filter: String,
    pub filtering: bool,
    pub cursor: usize,
    pub selection: BTreeSet<String>,
    pub next_token: Option<String>,
    pub loading: bool,
    pub modal: Modal,
    pub status: Option<StatusLine>,
    pub quit: bool,

    pub pending_list: Option<ListTask>,
    pub pending_op: Option<JoinHandle<OpOutcome>>,
}

impl App {
    pub fn new(config: Config, gateway: Option<StorageService>, session: Session) -> Self {
        Self {
            config,
            gateway,
            sort: session.sort,
            session,
            view: ViewMode::Buckets,
            buckets: Vec::new(),
            objects: Vec::new(),
            bucket: None,
            prefix: String::new(),
            filter: String::new(),
            filtering: false,
            cursor: 0,
            selection: BTreeSet::new(),
            next_token: None,
            loading: false,
            modal: Modal::None,
            status: None,
            quit: false,
            pending_list: None,
            pending_op: None,
        }
    }

    /// R2 without API keys: the externally supplied names are the whole
    /// bucket list.
    pub fn seed_external_buckets(&mut self) {
        if self.gateway.is_some() {
            return;
        }
        self.buckets = self
            .config
            .external_buckets()
            .iter()
            .map(|name| BucketEntry {
                name: name.clone(),
                created_at: None,
            })
            .collect();
        sort_buckets(&mut self.buckets, self.sort);
    }

    pub fn visible_buckets(&self) -> Vec<&BucketEntry> {
        fuzzy::rank(&self.filter, self.buckets.iter().collect(), |bucket| {
            bucket.name.as_str()
        })
    }

    pub fn visible_objects(&self) -> Vec<&ObjectEntry> {
        fuzzy::rank(&self.filter, self.objects.iter().collect(), |entry| {
            entry.file_name()
        })
    }

    pub fn visible_len(&self) -> usize {
        match self.view {
            ViewMode::Buckets => self.visible_buckets().len(),
            ViewMode::Objects => self.visible_objects().len(),
        }
    }

    pub fn cursor_object(&self) -> Option<&ObjectEntry> {
        self.visible_objects().get(self.cursor).copied()
    }

    pub fn cursor_bucket(&self) -> Option<&BucketEntry> {
        self.visible_buckets().get(self.cursor).copied()
    }

    pub fn clamp_cursor(&mut self) {
        let len = self.visible_len();
        if len == 0 {
            self.cursor = 0;
        } else if self.cursor >= len {
            self.cursor = len - 1;
        }
    }

    pub fn move_down(&mut self) {
        if self.cursor + 1 < self.visible_len() {
            self.cursor += 1;
        }
    }

    pub fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn jump_top(&mut self) {
        self.cursor = 0;
    }

    pub fn jump_bottom(&mut self) {
        self.cursor = self.visible_len().saturating_sub(1);
    }

    pub fn push_filter(&mut self, c: char) {
        self.filter.push(c);
        self.cursor = 0;
    }

    pub fn pop_filter(&mut self) {
        self.filter.pop();
        self.cursor = 0;
    }

    pub fn clear_filter(&mut self) {
        self.filter.clear();
        self.filtering = false;
        self.cursor = 0;
    }

    /// Open the bucket (or directory) under the cursor. Without API
    /// credentials, entering a bucket raises the standing error modal
    /// instead.
    pub fn enter(&mut self) -> Option<Command> {
        match self.view {
            ViewMode::Buckets => {
                let name = self.cursor_bucket()?.name.clone();
                if self.config.needs_credentials() {
                    self.modal = Modal::Error(self.config.credentials_help().to_string());
                    return None;
                }
                self.view = ViewMode::Objects;
                self.bucket = Some(name.clone());
                self.prefix.clear();
                self.clear_filter();
                self.selection.clear();
                self.objects.clear();
                self.next_token = None;
                Some(Command::LoadObjects {
                    bucket: name,
                    prefix: String::new(),
                    append: false,
                })
            }
            ViewMode::Objects => {
                let entry = self.cursor_object()?;
                if !entry.is_directory {
                    return None;
                }
                let prefix = entry.key.clone();
                self.set_prefix(prefix)
            }
        }
    }

    /// Parent prefix, or the bucket list once the prefix is empty.
    pub fn back(&mut self) -> Option<Command> {
        match self.view {
            ViewMode::Buckets => None,
            ViewMode::Objects => {
                if self.prefix.is_empty() {
                    self.view = ViewMode::Buckets;
                    self.bucket = None;
                    self.objects.clear();
                    self.selection.clear();
                    self.next_token = None;
                    self.clear_filter();
                    self.cancel_pending_list();
                    None
                } else {
                    let parent = parent_prefix(&self.prefix);
                    self.set_prefix(parent)
                }
            }
        }
    }

    fn set_prefix(&mut self, prefix: String) -> Option<Command> {
        let bucket = self.bucket.clone()?;
        self.prefix = prefix.clone();
        self.clear_filter();
        self.selection.clear();
        self.objects.clear();
        self.next_token = None;
        Some(Command::LoadObjects {
            bucket,
            prefix,
            append: false,
        })
    }

    pub fn cycle_sort(&mut self) {
        self.sort = self.sort.next();
        match self.view {
            ViewMode::Buckets => sort_buckets(&mut self.buckets, self.sort),
            ViewMode::Objects => sort_objects(&mut self.objects, self.sort),
        }
        self.clamp_cursor();
    }

    pub fn toggle_select(&mut self) {
        if self.view != ViewMode::Objects {
            return;
        }
        let Some(key) = self.cursor_object().map(|entry| entry.key.clone()) else {
            return;
        };
        if !self.selection.remove(&key) {
            self.selection.insert(key);
        }
    }

    /// Everything visible selected, or nothing; never additive.
    pub fn select_all(&mut self) {
        if self.view != ViewMode::Objects {
            return;
        }
        let visible: Vec<String> = self
            .visible_objects()
            .iter()
            .map(|entry| entry.key.clone())
            .collect();
        let all_selected =
            !visible.is_empty() && visible.iter().all(|key| self.selection.contains(key));
        if all_selected {
            self.selection.clear();
        } else {
            self.selection = visible.into_iter().collect();
        }
    }

    /// The selection if there is one, else the entry under the cursor.
    pub fn delete_targets(&self) -> Vec<String> {
        if !self.selection.is_empty() {
            self.selection.iter().cloned().collect()
        } else {
            self.cursor_object()
                .map(|entry| vec![entry.key.clone()])
                .unwrap_or_default()
        }
    }

    pub fn refresh(&mut self) -> Option<Command> {
        match self.view {
            ViewMode::Buckets => self.gateway.is_some().then_some(Command::LoadBuckets),
            ViewMode::Objects => {
                let bucket = self.bucket.clone()?;
                Some(Command::LoadObjects {
                    bucket,
                    prefix: self.prefix.clone(),
                    append: false,
                })
            }
        }
    }

    /// Next-page prefetch while browsing unfiltered and the cursor nears
    /// the end of what is loaded.
    pub fn wants_more(&self) -> Option<Command> {
        if self.view != ViewMode::Objects || self.pending_list.is_some() || !self.filter.is_empty()
        {
            return None;
        }
        self.next_token.as_ref()?;
        let total = self.objects.len();
        if total == 0 || self.cursor + LOAD_MORE_THRESHOLD < total {
            return None;
        }
        let bucket = self.bucket.clone()?;
        Some(Command::LoadObjects {
            bucket,
            prefix: self.prefix.clone(),
            append: true,
        })
    }

    pub fn apply_bucket_listing(&mut self, result: Result<Vec<BucketEntry>>) {
        self.loading = false;
        match result {
            Ok(mut buckets) => {
                sort_buckets(&mut buckets, self.sort);
                self.buckets = buckets;
                if self.view == ViewMode::Buckets {
                    self.clamp_cursor();
                }
            }
            Err(err) => {
                self.buckets.clear();
                if self.view == ViewMode::Buckets {
                    self.cursor = 0;
                }
                self.set_status(format!("Bucket listing failed: {err:#}"), true);
            }
        }
    }

    /// Applies one listing page, but only if its (bucket, prefix) tag still
    /// matches where the user is; late results for old targets are dropped.
    pub fn apply_object_listing(
        &mut self,
        bucket: &str,
        prefix: &str,
        append: bool,
        result: Result<ListPage>,
    ) {
        self.loading = false;
        if self.view != ViewMode::Objects
            || self.bucket.as_deref() != Some(bucket)
            || self.prefix != prefix
        {
            return;
        }
        match result {
            Ok(page) => {
                self.next_token = page.next_token;
                if append {
                    self.objects.extend(page.entries);
                } else {
                    self.objects = page.entries;
                    self.selection.clear();
                    self.cursor = 0;
                }
                sort_objects(&mut self.objects, self.sort);
                self.clamp_cursor();
            }
            Err(err) => {
                self.objects.clear();
                self.next_token = None;
                self.selection.clear();
                self.cursor = 0;
                self.set_status(format!("Listing failed: {err:#}"), true);
            }
        }
    }

    /// Folds a finished operation back into the state; may hand back a
    /// refresh command for the affected view.
    pub fn apply_op_outcome(&mut self, outcome: OpOutcome) -> Option<Command> {
        let OpOutcome {
            message,
            error,
            refresh,
            remove_keys,
            status_secs,
        } = outcome;
        if !remove_keys.is_empty() {
            for key in &remove_keys {
                self.selection.remove(key);
            }
            let gone: BTreeSet<String> = remove_keys.into_iter().collect();
            self.objects.retain(|entry| !gone.contains(&entry.key));
            self.clamp_cursor();
        }
        self.set_status_for(message, error, status_secs);
        match refresh {
            Refresh::None => None,
            Refresh::Objects => match self.view {
                ViewMode::Objects => self.refresh(),
                ViewMode::Buckets => None,
            },
            Refresh::Buckets => self.gateway.is_some().then_some(Command::LoadBuckets),
        }
    }

    pub fn set_status(&mut self, text: String, error: bool) {
        self.set_status_for(text, error, 3);
    }

    pub fn set_status_for(&mut self, text: String, error: bool, secs: u64) {
        self.status = Some(StatusLine {
            text,
            error,
            expires_at: Instant::now() + Duration::from_secs(secs),
        });
    }

    pub fn tick_status(&mut self) {
        if self
            .status
            .as_ref()
            .is_some_and(|status| Instant::now() >= status.expires_at)
        {
            self.status = None;
        }
    }

    pub fn cancel_pending_list(&mut self) {
        if let Some(task) = self.pending_list.take() {
            task.abort();
        }
        self.loading = false;
    }
}
