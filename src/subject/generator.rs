//! Subject generator
//!
//! Pull-based driver over a list of object IDs. Each call to `next`:
//! 1. takes the next pending object ID
//! 2. fetches its record once
//! 3. runs every configured media generator against the record
//! 4. returns the subject holding whatever the generators produced
//!
//! A failed fetch skips that object ID: the error is collected, passed to
//! the error callback if one is set, and iteration moves on. A failed
//! generator only removes its role from the subject and is recorded in the
//! subject's metadata. Nothing is written to disk here.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::iter::FusedIterator;

use super::Subject;
use crate::error::{ConfigError, FetchError};
use crate::fetch::DataFetcher;
use crate::media::MediaGenerator;
use crate::record::{ObjectId, ObjectRecord};

/// Observable position of the generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Object IDs still waiting to be processed
    Pending { remaining: usize },
    /// Every object ID has been processed
    Done,
}

/// Callback invoked for every skipped object
pub type FetchErrorHook = Box<dyn FnMut(&FetchError)>;

/// Lazily turns object IDs into subjects, in input order
pub struct SubjectGenerator<F> {
    pending: VecDeque<(usize, ObjectId)>,
    fetcher: F,
    generators: Vec<Box<dyn MediaGenerator>>,
    start_index: u64,
    fetch_failures: Vec<FetchError>,
    on_fetch_error: Option<FetchErrorHook>,
}

impl<F: DataFetcher> SubjectGenerator<F> {
    /// Validate the configuration and queue the object IDs
    ///
    /// Fails when no generator is configured, when two generators share a
    /// role name, or when an object ID is empty.
    pub fn new<I, T>(
        object_ids: I,
        fetcher: F,
        generators: Vec<Box<dyn MediaGenerator>>,
    ) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<ObjectId>,
    {
        if generators.is_empty() {
            return Err(ConfigError::NoGenerators);
        }
        let mut roles = HashSet::new();
        for generator in &generators {
            if !roles.insert(generator.role().to_string()) {
                return Err(ConfigError::DuplicateRole(generator.role().to_string()));
            }
        }

        let mut pending = VecDeque::new();
        for (position, id) in object_ids.into_iter().enumerate() {
            let id: ObjectId = id.into();
            if !id.is_valid() {
                return Err(ConfigError::InvalidObjectId { position });
            }
            pending.push_back((position, id));
        }

        tracing::debug!(
            objects = pending.len(),
            generators = ?generators.iter().map(|g| g.role()).collect::<Vec<_>>(),
            "Initialized subject generator"
        );

        Ok(Self {
            pending,
            fetcher,
            generators,
            start_index: 1,
            fetch_failures: Vec::new(),
            on_fetch_error: None,
        })
    }

    /// Index given to the first object ID (default 1)
    ///
    /// Fails when the index of the last queued object would not fit in a u64.
    pub fn with_start_index(mut self, start_index: u64) -> Result<Self, ConfigError> {
        let last_position = self.pending.back().map_or(0, |(position, _)| *position as u64);
        if start_index.checked_add(last_position).is_none() {
            return Err(ConfigError::StartIndexOverflow {
                start_index,
                objects: self.pending.len(),
            });
        }
        self.start_index = start_index;
        Ok(self)
    }

    /// Call `hook` for every object skipped because its fetch failed
    pub fn on_fetch_error(mut self, hook: impl FnMut(&FetchError) + 'static) -> Self {
        self.on_fetch_error = Some(Box::new(hook));
        self
    }

    /// Fetch errors collected so far, in the order they happened
    pub fn fetch_failures(&self) -> &[FetchError] {
        &self.fetch_failures
    }

    pub fn state(&self) -> GeneratorState {
        if self.pending.is_empty() {
            GeneratorState::Done
        } else {
            GeneratorState::Pending {
                remaining: self.pending.len(),
            }
        }
    }

    /// Role names of the configured generators, in run order
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.generators.iter().map(|g| g.role())
    }

    /// Run every generator against one fetched record
    fn build_subject(&self, position: usize, object_id: &ObjectId, record: &ObjectRecord) -> Subject {
        let index = self.start_index + position as u64;
        let mut subject = Subject::new(object_id.clone(), index);

        for generator in &self.generators {
            let role = generator.role();
            match generator.generate(record, object_id) {
                Ok(mut artifact) => {
                    artifact.set_role(role);
                    subject.insert_artifact(artifact);
                }
                Err(e) => {
                    tracing::warn!(object_id = %object_id, role, "Media generation failed: {}", e);
                    subject.record_failure(role, &e);
                }
            }
        }

        tracing::info!(
            object_id = %object_id,
            index,
            artifacts = subject.artifacts().count(),
            failed = subject.failures().len(),
            "Generated subject"
        );
        subject
    }

    fn skip(&mut self, error: FetchError) {
        tracing::warn!("Skipping object {}: {}", error.object_id(), error);
        if let Some(hook) = self.on_fetch_error.as_mut() {
            hook(&error);
        }
        self.fetch_failures.push(error);
    }
}

impl<F: DataFetcher> Iterator for SubjectGenerator<F> {
    type Item = Subject;

    fn next(&mut self) -> Option<Subject> {
        while let Some((position, object_id)) = self.pending.pop_front() {
            tracing::debug!(object_id = %object_id, position, "Fetching object");
            match self.fetcher.fetch(&object_id) {
                Ok(record) => return Some(self.build_subject(position, &object_id, &record)),
                Err(e) => self.skip(e),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.pending.len()))
    }
}

impl<F: DataFetcher> FusedIterator for SubjectGenerator<F> {}

impl<F> fmt::Debug for SubjectGenerator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubjectGenerator")
            .field("pending", &self.pending.len())
            .field(
                "generators",
                &self.generators.iter().map(|g| g.role()).collect::<Vec<_>>(),
            )
            .field("start_index", &self.start_index)
            .field("fetch_failures", &self.fetch_failures.len())
            .finish()
    }
}
