use tracing::debug;

use lineage_store::{AttributeStore, RecordRef};
use lineage_types::{AttrValue, AttributeKey, EntityId, Member};

use crate::error::SdkResult;
use crate::lineage::Lineage;

/// Builder that attaches several attributes to one entity in a single
/// write.
///
/// ```ignore
/// lineage
///     .declare(widget)
///     .attr(color, "red")
///     .member_attr(title, label, "Title")
///     .apply()?;
/// ```
#[must_use = "a declaration does nothing until applied"]
pub struct Declaration<'a> {
    lineage: &'a Lineage,
    entity: EntityId,
    records: Vec<(AttributeKey, Option<Member>, AttrValue)>,
}

impl<'a> Declaration<'a> {
    pub(crate) fn new(lineage: &'a Lineage, entity: EntityId) -> Self {
        Self {
            lineage,
            entity,
            records: Vec::new(),
        }
    }

    /// Attach `value` under `key` to the entity itself.
    pub fn attr(mut self, key: AttributeKey, value: impl Into<AttrValue>) -> Self {
        self.records.push((key, None, value.into()));
        self
    }

    /// Attach `value` under `key` to one member of the entity.
    pub fn member_attr(
        mut self,
        member: Member,
        key: AttributeKey,
        value: impl Into<AttrValue>,
    ) -> Self {
        self.records.push((key, Some(member), value.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Register every key, write every record, then drop stale resolutions.
    ///
    /// Later records for the same `(key, member)` overwrite earlier ones.
    /// Returns how many records were written.
    pub fn apply(self) -> SdkResult<usize> {
        if self.records.is_empty() {
            return Ok(0);
        }
        for (key, _, _) in &self.records {
            self.lineage.keys().register(key.clone());
        }

        let count = self.records.len();
        let writes: Vec<(RecordRef<'_>, AttrValue)> = self
            .records
            .iter()
            .map(|(key, member, value)| {
                (RecordRef::new(key, self.entity, member.as_ref()), value.clone())
            })
            .collect();
        self.lineage.store().set_batch(writes)?;
        self.lineage.purge([self.entity]);

        debug!(entity = %self.entity, count, "applied declaration");
        Ok(count)
    }
}
