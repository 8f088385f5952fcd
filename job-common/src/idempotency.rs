//! Idempotency decision engine: a pure mapping from store outcomes to ingestion control-flow
//! decisions, factored out of the handler so it is unit-testable without HTTP or a store.
use crate::store::StoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupDecision {
    Existing,
    Proceed,
    FailOpen,
    Error,
}

pub fn decide_lookup(found: bool, err: Option<&StoreError>) -> LookupDecision {
    match err {
        Some(StoreError::Unavailable(_)) => LookupDecision::FailOpen,
        Some(_) => LookupDecision::Error,
        None if found => LookupDecision::Existing,
        None => LookupDecision::Proceed,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateDecision {
    Ok,
    AlreadyExists,
    FailOpen,
    Error,
}

pub fn decide_create(err: Option<&StoreError>) -> CreateDecision {
    match err {
        None => CreateDecision::Ok,
        Some(StoreError::AlreadyExists) => CreateDecision::AlreadyExists,
        Some(StoreError::Unavailable(_)) => CreateDecision::FailOpen,
        Some(_) => CreateDecision::Error,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DuplicateDecision {
    ReturnExisting,
    Error,
}

pub fn decide_duplicate(found: bool, err: Option<&StoreError>) -> DuplicateDecision {
    if err.is_some() || !found {
        DuplicateDecision::Error
    } else {
        DuplicateDecision::ReturnExisting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_decisions() {
        assert_eq!(decide_lookup(true, None), LookupDecision::Existing);
        assert_eq!(decide_lookup(false, None), LookupDecision::Proceed);
        assert_eq!(
            decide_lookup(false, Some(&StoreError::Unavailable("down".into()))),
            LookupDecision::FailOpen
        );
        assert_eq!(
            decide_lookup(false, Some(&StoreError::Other("bug".into()))),
            LookupDecision::Error
        );
    }

    #[test]
    fn create_decisions() {
        assert_eq!(decide_create(None), CreateDecision::Ok);
        assert_eq!(
            decide_create(Some(&StoreError::AlreadyExists)),
            CreateDecision::AlreadyExists
        );
        assert_eq!(
            decide_create(Some(&StoreError::Unavailable("down".into()))),
            CreateDecision::FailOpen
        );
        assert_eq!(
            decide_create(Some(&StoreError::Other("bug".into()))),
            CreateDecision::Error
        );
    }

    #[test]
    fn duplicate_decisions() {
        assert_eq!(decide_duplicate(true, None), DuplicateDecision::ReturnExisting);
        assert_eq!(decide_duplicate(false, None), DuplicateDecision::Error);
        assert_eq!(
            decide_duplicate(true, Some(&StoreError::Other("bug".into()))),
            DuplicateDecision::Error
        );
    }
}
