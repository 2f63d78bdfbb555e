/// Decides whether a settled view deserves the full-resolution pass.
pub trait RefinePolicy {
    fn decide(&mut self, is_interacting: bool) -> bool;
}

/// Refine whenever the user is not interacting.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefineWhenIdle;

impl RefinePolicy for RefineWhenIdle {
    fn decide(&mut self, is_interacting: bool) -> bool {
        !is_interacting
    }
}

impl<F> RefinePolicy for F
where
    F: FnMut(bool) -> bool,
{
    fn decide(&mut self, is_interacting: bool) -> bool {
        self(is_interacting)
    }
}
