use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use ulid::Ulid;

use crate::model::*;

use super::EngineError;
use super::snapshot::ScheduleSource;

type Members = Rc<BTreeSet<Ulid>>;

/// Expands cohort references into student sets for one validation call.
///
/// Small groups carry no key to the large group they were formed from; the
/// only link is shared students. A dangling reference resolves to the empty
/// set: a missing cohort never blocks scheduling on its own.
pub struct CohortResolver<'s, S: ScheduleSource + ?Sized> {
    source: &'s S,
    members: RefCell<HashMap<CohortRef, Members>>,
    children: RefCell<HashMap<CohortRef, Rc<Vec<CohortRef>>>>,
}

impl<'s, S: ScheduleSource + ?Sized> CohortResolver<'s, S> {
    pub fn new(source: &'s S) -> Self {
        Self {
            source,
            members: RefCell::new(HashMap::new()),
            children: RefCell::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &'s S {
        self.source
    }

    pub fn members_of(&self, cohort: Option<&CohortRef>) -> Result<Members, EngineError> {
        let Some(cohort) = cohort else {
            return Ok(Rc::default());
        };
        if let Some(hit) = self.members.borrow().get(cohort) {
            return Ok(hit.clone());
        }
        let resolved: Members = Rc::new(
            self.source
                .cohort(cohort)?
                .map(|c| c.members)
                .unwrap_or_default(),
        );
        self.members.borrow_mut().insert(*cohort, resolved.clone());
        Ok(resolved)
    }

    /// True iff the two cohorts share at least one student.
    pub fn overlaps(&self, a: Option<&CohortRef>, b: Option<&CohortRef>) -> Result<bool, EngineError> {
        let (Some(a), Some(b)) = (a, b) else {
            return Ok(false);
        };
        if a == b {
            return Ok(!self.members_of(Some(a))?.is_empty());
        }
        let ma = self.members_of(Some(a))?;
        let mb = self.members_of(Some(b))?;
        let (small, large) = if ma.len() <= mb.len() { (&ma, &mb) } else { (&mb, &ma) };
        Ok(small.iter().any(|s| large.contains(s)))
    }

    /// Small cohorts formed from a large cohort: same family, same semester for
    /// regular groups, and at least one shared student. Empty for small cohorts
    /// and dangling references.
    pub fn small_groups_of(&self, large: &CohortRef) -> Result<Rc<Vec<CohortRef>>, EngineError> {
        if !large.is_large() {
            return Ok(Rc::default());
        }
        if let Some(hit) = self.children.borrow().get(large) {
            return Ok(hit.clone());
        }
        let semester = match self.source.cohort(large)? {
            Some(cohort) => cohort.semester,
            None => {
                self.children.borrow_mut().insert(*large, Rc::default());
                return Ok(Rc::default());
            }
        };
        let mut found = Vec::new();
        for candidate in self.source.small_cohorts(large.family(), semester)? {
            if self.overlaps(Some(large), Some(&candidate))? {
                found.push(candidate);
            }
        }
        let found = Rc::new(found);
        self.children.borrow_mut().insert(*large, found.clone());
        Ok(found)
    }

    /// Cohort collision between two entries: direct membership overlap, or
    /// overlap with a small group formed from the other side's large group,
    /// checked in both directions.
    pub fn collides(&self, a: Option<&CohortRef>, b: Option<&CohortRef>) -> Result<bool, EngineError> {
        let (Some(ca), Some(cb)) = (a, b) else {
            return Ok(false);
        };
        if self.overlaps(a, b)? {
            return Ok(true);
        }
        for child in self.small_groups_of(cb)?.iter() {
            if self.overlaps(a, Some(child))? {
                return Ok(true);
            }
        }
        for child in self.small_groups_of(ca)?.iter() {
            if self.overlaps(Some(child), b)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn name_of(&self, cohort: &CohortRef) -> Result<Option<String>, EngineError> {
        Ok(self.source.cohort(cohort)?.map(|c| c.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::Fixture;

    #[test]
    fn none_and_dangling_resolve_empty() {
        let fx = Fixture::new();
        let snap = fx.snapshot();
        let r = CohortResolver::new(&snap);
        assert!(r.members_of(None).unwrap().is_empty());
        assert!(r.members_of(Some(&CohortRef::LargeGroup(Ulid::new()))).unwrap().is_empty());
        assert!(!r.overlaps(Some(&CohortRef::SmallGroup(Ulid::new())), Some(&fx.large_s3)).unwrap());
    }

    #[test]
    fn large_group_overlaps_its_own_small_groups() {
        let fx = Fixture::new();
        let snap = fx.snapshot();
        let r = CohortResolver::new(&snap);
        assert!(r.overlaps(Some(&fx.large_s3), Some(&fx.small_s3_a)).unwrap());
        assert!(r.overlaps(Some(&fx.small_s3_b), Some(&fx.large_s3)).unwrap());
        assert!(!r.overlaps(Some(&fx.large_s5), Some(&fx.small_s3_a)).unwrap());
    }

    #[test]
    fn overlap_is_symmetric() {
        let fx = Fixture::new();
        let snap = fx.snapshot();
        let r = CohortResolver::new(&snap);
        let all = fx.all_cohorts();
        for a in &all {
            for b in &all {
                assert_eq!(
                    r.overlaps(Some(a), Some(b)).unwrap(),
                    r.overlaps(Some(b), Some(a)).unwrap(),
                    "{a:?} vs {b:?}"
                );
                assert_eq!(
                    r.collides(Some(a), Some(b)).unwrap(),
                    r.collides(Some(b), Some(a)).unwrap(),
                    "{a:?} vs {b:?}"
                );
            }
        }
    }

    #[test]
    fn sibling_small_groups_do_not_overlap() {
        let fx = Fixture::new();
        let snap = fx.snapshot();
        let r = CohortResolver::new(&snap);
        assert!(!r.overlaps(Some(&fx.small_s3_a), Some(&fx.small_s3_b)).unwrap());
        assert!(!r.collides(Some(&fx.small_s3_a), Some(&fx.small_s3_b)).unwrap());
    }

    #[test]
    fn intersession_roster_sharing_students_overlaps_regular_group() {
        let fx = Fixture::new();
        let snap = fx.snapshot();
        let r = CohortResolver::new(&snap);
        // The intersession roster holds one semester-3 student.
        assert!(r.overlaps(Some(&fx.large_intersession), Some(&fx.large_s3)).unwrap());
        assert!(!r.overlaps(Some(&fx.large_intersession), Some(&fx.large_s5)).unwrap());
    }

    #[test]
    fn small_groups_of_large_group_found_by_membership() {
        let fx = Fixture::new();
        let snap = fx.snapshot();
        let r = CohortResolver::new(&snap);
        let kids = r.small_groups_of(&fx.large_s3).unwrap();
        assert_eq!(kids.len(), 2);
        assert!(r.small_groups_of(&fx.small_s3_a).unwrap().is_empty());
        let kids = r.small_groups_of(&fx.large_intersession).unwrap();
        assert_eq!(kids.as_slice(), &[fx.small_intersession]);
    }

    #[test]
    fn collides_through_small_group_of_the_other_side() {
        let fx = Fixture::new();
        let snap = fx.snapshot();
        let r = CohortResolver::new(&snap);
        // The intersession small group holds one roster member and one student
        // outside the roster.
        assert!(r.collides(Some(&fx.large_intersession), Some(&fx.small_intersession)).unwrap());
        assert!(r.collides(Some(&fx.outsider_roster), Some(&fx.large_intersession)).unwrap());
        assert!(!r.overlaps(Some(&fx.outsider_roster), Some(&fx.large_intersession)).unwrap());
    }
}
