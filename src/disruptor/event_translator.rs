//! Event translators
//!
//! Translators fill a claimed slot with data. `Producer::publish_event*`
//! claims the next sequence, runs the translator against the slot and
//! publishes it, so a translator never sees a slot a consumer can read.

/// Fills an event from data captured by the translator itself
///
/// # Examples
/// ```
/// use seqflow::disruptor::EventTranslator;
///
/// #[derive(Default)]
/// struct Trade {
///     price: u64,
///     sequence: i64,
/// }
///
/// struct FixedPrice(u64);
///
/// impl EventTranslator<Trade> for FixedPrice {
///     fn translate_to(&self, event: &mut Trade, sequence: i64) {
///         event.price = self.0;
///         event.sequence = sequence;
///     }
/// }
/// ```
pub trait EventTranslator<T>: Send + Sync {
    /// Populate `event`, which lives at `sequence`
    fn translate_to(&self, event: &mut T, sequence: i64);
}

/// Translator taking one argument per publish
pub trait EventTranslatorOneArg<T, A>: Send + Sync {
    /// Populate `event` from `arg0`
    fn translate_to(&self, event: &mut T, sequence: i64, arg0: A);
}

/// Translator taking two arguments per publish
pub trait EventTranslatorTwoArg<T, A, B>: Send + Sync {
    /// Populate `event` from `arg0` and `arg1`
    fn translate_to(&self, event: &mut T, sequence: i64, arg0: A, arg1: B);
}

/// Translator taking three arguments per publish
pub trait EventTranslatorThreeArg<T, A, B, C>: Send + Sync {
    /// Populate `event` from `arg0`, `arg1` and `arg2`
    fn translate_to(&self, event: &mut T, sequence: i64, arg0: A, arg1: B, arg2: C);
}

/// Generates a closure-backed implementation of one translator trait
macro_rules! closure_translator {
    ($(#[$doc:meta])* $name:ident, $translator:ident<$($arg:ident: $ty:ident),*>) => {
        $(#[$doc])*
        pub struct $name<T, $($ty,)* F> {
            translator_fn: F,
            _phantom: std::marker::PhantomData<fn(&mut T $(, $ty)*)>,
        }

        impl<T, $($ty,)* F> $name<T, $($ty,)* F>
        where
            F: Fn(&mut T, i64 $(, $ty)*) + Send + Sync,
        {
            /// Wrap `translator_fn`
            pub fn new(translator_fn: F) -> Self {
                Self {
                    translator_fn,
                    _phantom: std::marker::PhantomData,
                }
            }
        }

        impl<T, $($ty,)* F> $translator<T $(, $ty)*> for $name<T, $($ty,)* F>
        where
            F: Fn(&mut T, i64 $(, $ty)*) + Send + Sync,
        {
            fn translate_to(&self, event: &mut T, sequence: i64 $(, $arg: $ty)*) {
                (self.translator_fn)(event, sequence $(, $arg)*)
            }
        }
    };
}

closure_translator!(
    /// Closure-based [`EventTranslator`]
    ClosureEventTranslator,
    EventTranslator<>
);
closure_translator!(
    /// Closure-based [`EventTranslatorOneArg`]
    ClosureEventTranslatorOneArg,
    EventTranslatorOneArg<arg0: A>
);
closure_translator!(
    /// Closure-based [`EventTranslatorTwoArg`]
    ClosureEventTranslatorTwoArg,
    EventTranslatorTwoArg<arg0: A, arg1: B>
);
closure_translator!(
    /// Closure-based [`EventTranslatorThreeArg`]
    ClosureEventTranslatorThreeArg,
    EventTranslatorThreeArg<arg0: A, arg1: B, arg2: C>
);

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Trade {
        price: u64,
        quantity: u32,
        side: char,
        sequence: i64,
    }

    #[test]
    fn test_closure_translators_fill_event() {
        let mut trade = Trade::default();

        ClosureEventTranslator::new(|e: &mut Trade, seq| e.sequence = seq).translate_to(&mut trade, 3);
        assert_eq!(trade.sequence, 3);

        ClosureEventTranslatorOneArg::new(|e: &mut Trade, _seq, price: u64| e.price = price)
            .translate_to(&mut trade, 4, 101);
        assert_eq!(trade.price, 101);

        ClosureEventTranslatorTwoArg::new(|e: &mut Trade, _seq, price: u64, qty: u32| {
            e.price = price;
            e.quantity = qty;
        })
        .translate_to(&mut trade, 5, 102, 9);
        assert_eq!((trade.price, trade.quantity), (102, 9));

        ClosureEventTranslatorThreeArg::new(|e: &mut Trade, seq, price: u64, qty: u32, side: char| {
            e.price = price;
            e.quantity = qty;
            e.side = side;
            e.sequence = seq;
        })
        .translate_to(&mut trade, 6, 103, 10, 'B');
        assert_eq!((trade.price, trade.quantity, trade.side, trade.sequence), (103, 10, 'B', 6));
    }
}
