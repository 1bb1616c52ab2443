//! Worker thread that runs engine calls off the control thread.
//!
//! Requests arrive on an mpsc channel, execute against the boxed engine, and
//! the replies go back into the application's event channel where they
//! interleave with user events. Errors are formatted to strings here so
//! nothing non-Send crosses the boundary.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use color_eyre::Result;
use log::debug;

use crate::engine::{EngineReply, EngineRequest, GroupingSpec, Mutation, TableEngine};
use crate::error_display::user_message_from_report;
use crate::AppEvent;

pub struct EngineBridge {
    requests: Sender<EngineRequest>,
    worker: JoinHandle<()>,
}

impl EngineBridge {
    /// Spawn the worker around `engine`. Replies are posted to `events`.
    pub fn spawn<E>(engine: E, events: Sender<AppEvent>) -> Result<Self>
    where
        E: TableEngine + 'static,
    {
        let (requests, inbox) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("tabscope-engine".to_string())
            .spawn(move || run_worker(engine, inbox, events))?;
        Ok(Self { requests, worker })
    }

    pub fn requests(&self) -> Sender<EngineRequest> {
        self.requests.clone()
    }

    /// Close the request channel and wait for the worker to drain and exit.
    pub fn join(self) {
        drop(self.requests);
        if self.worker.join().is_err() {
            debug!("engine worker panicked during shutdown");
        }
    }
}

fn run_worker<E: TableEngine>(
    mut engine: E,
    inbox: Receiver<EngineRequest>,
    events: Sender<AppEvent>,
) {
    while let Ok(request) = inbox.recv() {
        let reply = execute(&mut engine, request);
        if events.send(AppEvent::Engine(reply)).is_err() {
            // Application side is gone, nothing left to reply to.
            break;
        }
    }
    debug!("engine worker exiting");
}

fn execute<E: TableEngine>(engine: &mut E, request: EngineRequest) -> EngineReply {
    match request {
        EngineRequest::Load(path) => {
            let result = engine
                .load(&path)
                .map_err(|e| user_message_from_report(&e, Some(&path)));
            EngineReply::Loaded { path, result }
        }
        EngineRequest::Columns { purpose, epoch } => EngineReply::Columns {
            purpose,
            epoch,
            result: engine
                .columns()
                .map_err(|e| user_message_from_report(&e, None)),
        },
        EngineRequest::RowCount { epoch } => EngineReply::RowCount {
            epoch,
            result: engine
                .row_count()
                .map_err(|e| user_message_from_report(&e, None)),
        },
        EngineRequest::Rows {
            start,
            limit,
            generation,
        } => EngineReply::Rows {
            start,
            limit,
            generation,
            result: engine
                .rows(start, limit)
                .map_err(|e| user_message_from_report(&e, None)),
        },
        EngineRequest::Mutate { mutation, epoch } => {
            let result = match &mutation {
                Mutation::Sort { column, descending } => {
                    engine.apply_sort(column.as_deref(), *descending)
                }
                Mutation::QuickFilter { column, query } => {
                    engine.apply_filter(column.as_deref(), query)
                }
                Mutation::AdvancedFilter { tree } => engine.apply_advanced_filter(tree),
                Mutation::ResetGrouping => engine.reset_grouping(),
            }
            .map_err(|e| user_message_from_report(&e, None));
            EngineReply::MutationApplied {
                mutation,
                epoch,
                result,
            }
        }
        EngineRequest::GroupBy {
            column,
            aggregation,
            epoch,
        } => {
            let result = engine
                .apply_group_by(&column, aggregation)
                .map_err(|e| user_message_from_report(&e, None));
            EngineReply::Grouped {
                spec: GroupingSpec {
                    column,
                    aggregation,
                },
                epoch,
                result,
            }
        }
        EngineRequest::Snapshot => EngineReply::Snapshot {
            result: engine
                .current_state()
                .map_err(|e| user_message_from_report(&e, None)),
        },
    }
}
