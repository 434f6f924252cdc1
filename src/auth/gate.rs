// Planora Client — Page permission gating
//
// Pure policy evaluation: which page a visitor may enter given login and
// subscription state. Front-ends translate the decision into navigation.

/// Pages of the Planora front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Landing,
    Activation,
    Planner,
    Topics,
    Scripts,
    Account,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Policy {
    Public,
    RequiresLogin,
    RequiresSubscription,
}

impl Page {
    fn policy(self) -> Policy {
        match self {
            Page::Landing | Page::Activation => Policy::Public,
            Page::Account => Policy::RequiresLogin,
            Page::Planner | Page::Topics | Page::Scripts => Policy::RequiresSubscription,
        }
    }
}

/// Outcome of a gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    /// Not logged in — send the visitor to the login flow.
    RedirectLogin,
    /// Logged in but not subscribed — send them to the upgrade page.
    RedirectUpgrade,
}

/// Evaluate whether the given page may be entered.
pub fn evaluate(page: Page, logged_in: bool, subscription_active: bool) -> AccessDecision {
    match page.policy() {
        Policy::Public => AccessDecision::Allow,
        Policy::RequiresLogin => {
            if logged_in {
                AccessDecision::Allow
            } else {
                AccessDecision::RedirectLogin
            }
        }
        Policy::RequiresSubscription => {
            if !logged_in {
                AccessDecision::RedirectLogin
            } else if !subscription_active {
                AccessDecision::RedirectUpgrade
            } else {
                AccessDecision::Allow
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
