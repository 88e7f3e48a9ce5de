//! Navigation rules: which screens a user may open given their account state.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Register,
    Home,
    CareerSelection,
    Subjects,
    Schedule,
    StudyCycle,
    Study,
    History,
    Premium,
}

impl Route {
    pub const ALL: [Route; 10] = [
        Route::Login,
        Route::Register,
        Route::Home,
        Route::CareerSelection,
        Route::Subjects,
        Route::Schedule,
        Route::StudyCycle,
        Route::Study,
        Route::History,
        Route::Premium,
    ];

    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Register => "/register",
            Route::Home => "/",
            Route::CareerSelection => "/career",
            Route::Subjects => "/subjects",
            Route::Schedule => "/schedule",
            Route::StudyCycle => "/study-cycle",
            Route::Study => "/study",
            Route::History => "/history",
            Route::Premium => "/premium",
        }
    }

    #[must_use]
    pub fn is_public(self) -> bool {
        matches!(self, Route::Login | Route::Register)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRoute(pub String);

impl fmt::Display for UnknownRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown route: {}", self.0)
    }
}

impl std::error::Error for UnknownRoute {}

impl FromStr for Route {
    type Err = UnknownRoute;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let normalized = if trimmed.len() > 1 {
            trimmed.trim_end_matches('/')
        } else {
            trimmed
        };
        Route::ALL
            .into_iter()
            .find(|route| route.path() == normalized)
            .ok_or_else(|| UnknownRoute(s.to_string()))
    }
}

/// Account facts the guard needs, gathered by the user service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessState {
    pub logged_in: bool,
    pub premium: bool,
    pub has_career: bool,
    pub selected_subjects: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Allow,
    Redirect(Route),
}

/// Decide whether `route` may be opened.
#[must_use]
pub fn guard(route: Route, access: &AccessState) -> Navigation {
    if route.is_public() {
        return if access.logged_in {
            Navigation::Redirect(Route::Home)
        } else {
            Navigation::Allow
        };
    }
    if !access.logged_in {
        return Navigation::Redirect(Route::Login);
    }

    let needs_subjects = match route {
        Route::Home | Route::CareerSelection | Route::Premium => return Navigation::Allow,
        Route::Subjects => false,
        _ => true,
    };

    if !access.has_career {
        return Navigation::Redirect(Route::CareerSelection);
    }
    if needs_subjects && access.selected_subjects == 0 {
        return Navigation::Redirect(Route::Subjects);
    }
    if route == Route::StudyCycle && !access.premium {
        return Navigation::Redirect(Route::Premium);
    }
    Navigation::Allow
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> AccessState {
        AccessState {
            logged_in: true,
            premium: false,
            has_career: true,
            selected_subjects: 3,
        }
    }

    #[test]
    fn anonymous_users_go_to_login() {
        let anon = AccessState::default();
        assert_eq!(guard(Route::Login, &anon), Navigation::Allow);
        assert_eq!(guard(Route::Register, &anon), Navigation::Allow);
        assert_eq!(guard(Route::Home, &anon), Navigation::Redirect(Route::Login));
        assert_eq!(guard(Route::Study, &anon), Navigation::Redirect(Route::Login));
    }

    #[test]
    fn logged_in_users_skip_login() {
        assert_eq!(guard(Route::Login, &ready()), Navigation::Redirect(Route::Home));
    }

    #[test]
    fn career_then_subjects_are_required() {
        let mut access = ready();
        access.has_career = false;
        assert_eq!(
            guard(Route::Subjects, &access),
            Navigation::Redirect(Route::CareerSelection)
        );
        assert_eq!(guard(Route::CareerSelection, &access), Navigation::Allow);

        access.has_career = true;
        access.selected_subjects = 0;
        assert_eq!(guard(Route::Subjects, &access), Navigation::Allow);
        assert_eq!(
            guard(Route::Schedule, &access),
            Navigation::Redirect(Route::Subjects)
        );
    }

    #[test]
    fn study_cycle_is_premium_only() {
        let mut access = ready();
        assert_eq!(
            guard(Route::StudyCycle, &access),
            Navigation::Redirect(Route::Premium)
        );
        access.premium = true;
        assert_eq!(guard(Route::StudyCycle, &access), Navigation::Allow);
        assert_eq!(guard(Route::History, &access), Navigation::Allow);
    }

    #[test]
    fn routes_parse_from_paths() {
        for route in Route::ALL {
            assert_eq!(route.path().parse::<Route>(), Ok(route));
        }
        assert_eq!("/history/".parse::<Route>(), Ok(Route::History));
        assert!("/nowhere".parse::<Route>().is_err());
    }
}
