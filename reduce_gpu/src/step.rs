pub struct MultStep {
    factor: usize,
    next: usize,
    limit: usize,
}

impl Iterator for MultStep {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.limit {
            return None;
        }
        let next = self.next;
        self.next *= self.factor;
        Some(next)
    }
}

// Returns an iterator that generates numbers by multiplying by the given
// factor, stopping before `limit`.
pub fn mult_step(init: usize, factor: usize, limit: usize) -> MultStep {
    MultStep {
        factor,
        next: init,
        limit,
    }
}

pub struct DivStep {
    denom: usize,
    next: usize,
}

impl Iterator for DivStep {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == 0 {
            return None;
        }
        let next = self.next;
        self.next /= self.denom;
        Some(next)
    }
}

// Returns an iterator that generates numbers by dividing by the given
// denominator, stopping once it reaches zero.
pub fn div_step(init: usize, denom: usize) -> DivStep {
    DivStep { denom, next: init }
}

/// The strides of the reduction rounds for one block, in the order they run.
pub enum Strides {
    Up(MultStep),
    Down(DivStep),
}

impl Iterator for Strides {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Strides::Up(steps) => steps.next(),
            Strides::Down(steps) => steps.next(),
        }
    }
}
