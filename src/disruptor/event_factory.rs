//! Event factories
//!
//! The ring buffer calls its factory once per slot at construction and
//! never again; every slot owns a distinct instance that is mutated in
//! place afterwards.

/// Creates the pre-allocated events that fill the ring buffer
///
/// # Examples
/// ```
/// use seqflow::disruptor::EventFactory;
///
/// struct Trade {
///     price: u64,
/// }
///
/// struct TradeFactory;
///
/// impl EventFactory<Trade> for TradeFactory {
///     fn new_instance(&self) -> Trade {
///         Trade { price: 0 }
///     }
/// }
/// ```
pub trait EventFactory<T>: Send + Sync {
    /// Produce one fresh event in its initial state
    fn new_instance(&self) -> T;
}

/// Factory for events that implement `Default`
pub struct DefaultEventFactory<T: Default> {
    _phantom: std::marker::PhantomData<fn() -> T>,
}

impl<T: Default> DefaultEventFactory<T> {
    /// Create a new default event factory
    pub fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T: Default> Default for DefaultEventFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default> EventFactory<T> for DefaultEventFactory<T> {
    fn new_instance(&self) -> T {
        T::default()
    }
}

/// Factory backed by a closure
pub struct ClosureEventFactory<T, F>
where
    F: Fn() -> T + Send + Sync,
{
    factory_fn: F,
    _phantom: std::marker::PhantomData<fn() -> T>,
}

impl<T, F> ClosureEventFactory<T, F>
where
    F: Fn() -> T + Send + Sync,
{
    /// Wrap `factory_fn` as an event factory
    pub fn new(factory_fn: F) -> Self {
        Self {
            factory_fn,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T, F> EventFactory<T> for ClosureEventFactory<T, F>
where
    F: Fn() -> T + Send + Sync,
{
    fn new_instance(&self) -> T {
        (self.factory_fn)()
    }
}

/// Factory that clones a prototype into every slot
pub struct CloneEventFactory<T: Clone> {
    prototype: T,
}

impl<T: Clone> CloneEventFactory<T> {
    /// Create a factory cloning `prototype`
    pub fn new(prototype: T) -> Self {
        Self { prototype }
    }
}

impl<T: Clone + Send + Sync> EventFactory<T> for CloneEventFactory<T> {
    fn new_instance(&self) -> T {
        self.prototype.clone()
    }
}

/// Shorthand for [`ClosureEventFactory::new`]
///
/// ```
/// use seqflow::disruptor::{event_factory, EventFactory};
///
/// let factory = event_factory(|| vec![0u8; 64]);
/// assert_eq!(factory.new_instance().len(), 64);
/// ```
pub fn event_factory<T, F>(factory_fn: F) -> ClosureEventFactory<T, F>
where
    F: Fn() -> T + Send + Sync,
{
    ClosureEventFactory::new(factory_fn)
}
