use kubeinv_types::{NamespaceGroup, ResourceRecord};

/// Group records by namespace in a single pass.
///
/// Nothing is reordered or deduplicated: two records with the same name and
/// namespace both end up in the group.
pub fn group<I>(records: I) -> NamespaceGroup
where
    I: IntoIterator<Item = ResourceRecord>,
{
    let mut groups = NamespaceGroup::new();
    for record in records {
        groups.push(record);
    }
    groups
}
