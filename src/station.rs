use std::fmt;

/// A unit of processing logic run by a stage worker.
///
/// `process` is called exactly once per item, on whichever worker received
/// it. It may call `emit` any number of times before returning, and must not
/// hold on to `emit` afterwards. Items the station does not recognise should be
/// skipped rather than treated as errors.
pub trait Station<T>: Send {
    fn process(&mut self, item: T, emit: &mut dyn FnMut(T));

    /// Get a human-readable name for this station
    fn name(&self) -> &str {
        "station"
    }
}

/// A station that produces trailing output once its input is exhausted.
///
/// `finalize` runs exactly once per worker, after that worker's share of the
/// input has closed and before its output closes. Sibling workers in a
/// fanned-out stage finalize in no particular order.
pub trait Finalizer<T>: Station<T> {
    fn finalize(&mut self, emit: &mut dyn FnMut(T));
}

/// A station with its capabilities resolved at construction time
pub enum StationHandle<T> {
    Plain(Box<dyn Station<T>>),
    Finalizing(Box<dyn Finalizer<T>>),
}

impl<T> StationHandle<T> {
    pub fn plain<S>(station: S) -> Self
    where
        S: Station<T> + 'static,
    {
        StationHandle::Plain(Box::new(station))
    }

    pub fn finalizing<S>(station: S) -> Self
    where
        S: Finalizer<T> + 'static,
    {
        StationHandle::Finalizing(Box::new(station))
    }

    pub fn name(&self) -> &str {
        match self {
            StationHandle::Plain(station) => station.name(),
            StationHandle::Finalizing(station) => station.name(),
        }
    }

    pub fn process(&mut self, item: T, emit: &mut dyn FnMut(T)) {
        match self {
            StationHandle::Plain(station) => station.process(item, emit),
            StationHandle::Finalizing(station) => station.process(item, emit),
        }
    }

    /// Run the finalize hook if the station has one; returns whether it ran
    pub fn finalize(&mut self, emit: &mut dyn FnMut(T)) -> bool {
        match self {
            StationHandle::Plain(_) => false,
            StationHandle::Finalizing(station) => {
                station.finalize(emit);
                true
            }
        }
    }

    pub fn is_finalizer(&self) -> bool {
        matches!(self, StationHandle::Finalizing(_))
    }
}

impl<T> fmt::Debug for StationHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StationHandle")
            .field("name", &self.name())
            .field("finalizer", &self.is_finalizer())
            .finish()
    }
}

/// Forwards every item unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl<T> Station<T> for Passthrough {
    fn process(&mut self, item: T, emit: &mut dyn FnMut(T)) {
        emit(item);
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

/// Forwards items matching a predicate
pub struct FilterStation<F> {
    name: String,
    predicate: F,
}

impl<F> FilterStation<F> {
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl<T, F> Station<T> for FilterStation<F>
where
    F: FnMut(&T) -> bool + Send,
{
    fn process(&mut self, item: T, emit: &mut dyn FnMut(T)) {
        if (self.predicate)(&item) {
            emit(item);
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Transforms each item into exactly one output
pub struct MapStation<F> {
    name: String,
    mapper: F,
}

impl<F> MapStation<F> {
    pub fn new(name: impl Into<String>, mapper: F) -> Self {
        Self {
            name: name.into(),
            mapper,
        }
    }
}

impl<T, F> Station<T> for MapStation<F>
where
    F: FnMut(T) -> T + Send,
{
    fn process(&mut self, item: T, emit: &mut dyn FnMut(T)) {
        emit((self.mapper)(item));
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Transforms each item into zero or more outputs
pub struct FlatMapStation<F> {
    name: String,
    mapper: F,
}

impl<F> FlatMapStation<F> {
    pub fn new(name: impl Into<String>, mapper: F) -> Self {
        Self {
            name: name.into(),
            mapper,
        }
    }
}

impl<T, F, I> Station<T> for FlatMapStation<F>
where
    F: FnMut(T) -> I + Send,
    I: IntoIterator<Item = T>,
{
    fn process(&mut self, item: T, emit: &mut dyn FnMut(T)) {
        for out in (self.mapper)(item) {
            emit(out);
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
