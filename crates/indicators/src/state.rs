use chartbands_core::BarEvent;

/// Two-tier indicator state.
///
/// `committed` is the snapshot taken when the previous bar closed; `live` is
/// what was computed for the bar currently being updated. Closing events
/// promote `live` to `committed`, ticks only ever rewrite `live`, so repeated
/// ticks on one bar all start from the same baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tiered<S> {
    committed: S,
    live: S,
}

impl<S: Copy> Tiered<S> {
    pub fn new(initial: S) -> Self {
        Self {
            committed: initial,
            live: initial,
        }
    }

    /// Start processing `event` and return the baseline to compute from.
    pub fn begin(&mut self, event: BarEvent) -> S {
        if event.commits() {
            self.committed = self.live;
        }
        self.committed
    }

    /// Record the state computed for the current bar.
    pub fn store(&mut self, live: S) {
        self.live = live;
    }

    pub fn committed(&self) -> &S {
        &self.committed
    }

    pub fn live(&self) -> &S {
        &self.live
    }

    pub fn reset(&mut self, initial: S) {
        self.committed = initial;
        self.live = initial;
    }
}
