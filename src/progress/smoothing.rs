/// Cosmetic catch-up for the displayed percent.
///
/// Each tick closes a tenth of the remaining gap (at least one point), so a
/// large jump from the stream eases in instead of snapping. A target below
/// the shown value means a new session started and the display resets.
#[derive(Debug, Default, Clone)]
pub struct DisplaySmoother {
    shown: u8,
}

impl DisplaySmoother {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn shown(&self) -> u8 {
        self.shown
    }

    /// Advance one animation tick toward `target`, returning the new shown value
    pub fn tick(&mut self, target: u8) -> u8 {
        let target = target.min(100);
        if target <= self.shown {
            self.shown = target;
            return self.shown;
        }

        let gap = target - self.shown;
        let step = gap.div_ceil(10).max(1);
        self.shown = (self.shown + step).min(target);
        self.shown
    }

    pub fn is_caught_up(&self, target: u8) -> bool {
        self.shown == target.min(100)
    }
}
