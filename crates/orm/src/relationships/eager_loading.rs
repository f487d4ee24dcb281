//! Relation expansion - rewrites a query to join or count its relations
//!
//! Every expansion produces pipeline stages. Nested relations become lookups
//! inside the parent lookup's sub-pipeline, so the whole tree stays one request.

use super::metadata::{FilterFn, RelationDescriptor, RelationKind};
use super::path::RelationPathNode;
use crate::backends::{Pipeline, Stage};
use crate::error::{ModelError, ModelResult, QueryError};
use crate::filter::{Filter, Operator};
use crate::model::{ModelDefinition, ModelRegistry, DELETED_AT};

/// Synthetic alias for counted joins
pub const COUNT_ALIAS: &str = "__relation";

/// Synthetic field holding the cardinality of [`COUNT_ALIAS`]
pub const COUNT_FIELD: &str = "__relation_count";

/// Stages keeping rows whose counted join satisfies `operator count`,
/// then removing the synthetic fields
pub fn count_constraint(operator: Operator, count: u64) -> ModelResult<Vec<Stage>> {
    if !matches!(
        operator,
        Operator::Eq | Operator::Ne | Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte
    ) {
        return Err(QueryError::UnsupportedOperation(format!(
            "'{}' cannot compare relation counts",
            operator
        ))
        .into());
    }

    Ok(vec![
        Stage::Count {
            field: COUNT_ALIAS.to_string(),
            into: COUNT_FIELD.to_string(),
        },
        Stage::Match(Filter::new().where_op(COUNT_FIELD, operator, count).into_root()),
        Stage::Unset(vec![COUNT_ALIAS.to_string(), COUNT_FIELD.to_string()]),
    ])
}

impl RelationDescriptor {
    /// Join predicate on target rows, referencing the owning row
    pub fn join_filter(&self) -> Filter {
        let foreign = self.get_foreign_key();
        let local = self.get_local_key();

        let on = match self.kind() {
            RelationKind::EmbedMany => Filter::new().where_outer(&foreign, Operator::In, &local),
            _ => Filter::new().where_outer(&foreign, Operator::Eq, &local),
        };

        match self.type_discriminator() {
            Some((field, owner)) => on.where_eq(&field, owner),
            None => on,
        }
    }

    /// Attached filter, soft-delete exclusion, caller filter; each its own group
    pub fn scoped_filter(
        &self,
        target: &ModelDefinition,
        with_trashed: bool,
        extra: Option<&FilterFn>,
    ) -> Filter {
        let mut filter = Filter::new();

        if let Some(attached) = self.attached_filter() {
            filter = filter.where_filter(attached(Filter::new()));
        }

        if target.uses_soft_deletes() && !with_trashed {
            filter = filter.where_filter(Filter::new().where_null(DELETED_AT));
        }

        if let Some(extra) = extra {
            filter = filter.where_filter(extra(Filter::new()));
        }

        filter
    }

    /// Stages joining this relation (and `children` beneath it) under its name
    pub fn load(
        &self,
        models: &ModelRegistry,
        children: &[RelationPathNode],
        with_trashed: bool,
        extra: Option<&FilterFn>,
    ) -> ModelResult<Vec<Stage>> {
        let target = models.get(self.related())?;
        let mut pipeline = Pipeline::select_collection(target.collection_name())
            .apply_filter(self.scoped_filter(&target, with_trashed, extra));

        for child in children {
            let relation = target
                .relation(&child.name)
                .ok_or_else(|| ModelError::unknown_relation(&child.name, target.name()))?;
            pipeline = pipeline.extend(relation.load(models, &child.children, with_trashed, None)?);
        }

        let mut stages = vec![Stage::Lookup {
            on: self.join_filter().into_root(),
            pipeline,
            alias: self.name().to_string(),
        }];

        if self.kind().is_single() {
            stages.push(Stage::Flatten {
                field: self.name().to_string(),
            });
        }

        tracing::debug!(
            "Expanded {} relation '{}' -> {}",
            self.kind(),
            self.name(),
            target.collection_name()
        );
        Ok(stages)
    }

    /// Stages joining this relation under [`COUNT_ALIAS`].
    ///
    /// With `rest` non-empty the next relation is counted inside this level's
    /// sub-pipeline and only rows with a non-empty next level are kept. The
    /// caller filter applies at the last segment only.
    pub fn load_count<S: AsRef<str>>(
        &self,
        models: &ModelRegistry,
        rest: &[S],
        with_trashed: bool,
        extra: Option<&FilterFn>,
    ) -> ModelResult<Vec<Stage>> {
        let target = models.get(self.related())?;
        let mut pipeline = Pipeline::select_collection(target.collection_name());

        match rest.split_first() {
            Some((next, rest)) => {
                let next = next.as_ref();
                let relation = target
                    .relation(next)
                    .ok_or_else(|| ModelError::unknown_relation(next, target.name()))?;

                pipeline = pipeline
                    .apply_filter(self.scoped_filter(&target, with_trashed, None))
                    .extend(relation.load_count(models, rest, with_trashed, extra)?)
                    .extend(count_constraint(Operator::Gte, 1)?);
            }
            None => {
                pipeline = pipeline.apply_filter(self.scoped_filter(&target, with_trashed, extra));
            }
        }

        Ok(vec![Stage::Lookup {
            on: self.join_filter().into_root(),
            pipeline,
            alias: COUNT_ALIAS.to_string(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterNode, Operand};
    use elif_validation::{types, Schema};
    use std::sync::Arc;

    fn registry() -> ModelRegistry {
        let models = ModelRegistry::new();
        models.register(
            ModelDefinition::new("User")
                .schema(Schema::new().field("username", types::string()))
                .has_many("chats", "Chat")
                .has_one("profile", "Profile"),
        );
        models.register(
            ModelDefinition::new("Chat")
                .has_many("messages", "Message")
                .soft_delete(true),
        );
        models.register(ModelDefinition::new("Message"));
        models.register(ModelDefinition::new("Profile"));
        models
    }

    fn lookup(stage: &Stage) -> (&FilterNode, &Pipeline, &str) {
        match stage {
            Stage::Lookup { on, pipeline, alias } => (on, pipeline, alias.as_str()),
            other => panic!("expected lookup, got {:?}", other),
        }
    }

    #[test]
    fn test_join_predicate_references_owner_row() {
        let models = registry();
        let user = models.get("User").unwrap();
        let on = user.relation("chats").unwrap().join_filter();

        assert_eq!(
            on.root().predicates(),
            vec![("user_id", Operator::Eq, &Operand::Outer("_id".to_string()))]
        );
    }

    #[test]
    fn test_load_nests_children_and_scopes_soft_delete() {
        let models = registry();
        let user = models.get("User").unwrap();
        let tree = vec![RelationPathNode {
            name: "chats".into(),
            children: vec![RelationPathNode::new("messages")],
        }];

        let stages = user
            .relation("chats")
            .unwrap()
            .load(&models, &tree[0].children, false, None)
            .unwrap();
        assert_eq!(stages.len(), 1);

        let (_, chats, alias) = lookup(&stages[0]);
        assert_eq!(alias, "chats");
        assert_eq!(chats.collection(), "chats");
        assert!(matches!(&chats.stages()[0], Stage::Match(_)));
        let (_, messages, alias) = lookup(&chats.stages()[1]);
        assert_eq!(alias, "messages");
        assert!(messages.stages().is_empty());
    }

    #[test]
    fn test_with_trashed_drops_scope() {
        let models = registry();
        let user = models.get("User").unwrap();
        let stages = user
            .relation("chats")
            .unwrap()
            .load(&models, &[], true, None)
            .unwrap();

        let (_, chats, _) = lookup(&stages[0]);
        assert!(chats.stages().is_empty());
    }

    #[test]
    fn test_has_one_is_flattened() {
        let models = registry();
        let user = models.get("User").unwrap();
        let stages = user.relation("profile").unwrap().load(&models, &[], false, None).unwrap();

        assert_eq!(stages.len(), 2);
        assert_eq!(stages[1], Stage::Flatten { field: "profile".into() });
    }

    #[test]
    fn test_unknown_child_relation() {
        let models = registry();
        let user = models.get("User").unwrap();
        let err = user
            .relation("chats")
            .unwrap()
            .load(&models, &[RelationPathNode::new("members")], false, None)
            .unwrap_err();

        assert_eq!(err.to_string(), "Relation 'members' does not exist on 'Chat' Model");
    }

    #[test]
    fn test_filter_composition_order() {
        let models = ModelRegistry::new();
        models.register(
            ModelDefinition::new("User").with_relation(
                RelationDescriptor::has_many("chats", "Chat").filter(|q| q.where_eq("open", true)),
            ),
        );
        models.register(ModelDefinition::new("Chat").soft_delete(true));

        let user = models.get("User").unwrap();
        let chat = models.get("Chat").unwrap();
        let extra: FilterFn = Arc::new(|q: Filter| q.where_gt("size", 2));
        let filter = user
            .relation("chats")
            .unwrap()
            .scoped_filter(&chat, false, Some(&extra));

        let fields: Vec<&str> = filter.root().predicates().iter().map(|p| p.0).collect();
        assert_eq!(fields, vec!["open", DELETED_AT, "size"]);
        let FilterNode::Group { children, .. } = filter.root() else { unreachable!() };
        assert!(children.iter().all(|c| matches!(c, FilterNode::Group { .. })));
    }

    #[test]
    fn test_load_count_nests_and_requires_non_empty() {
        let models = registry();
        let user = models.get("User").unwrap();
        let stages = user
            .relation("chats")
            .unwrap()
            .load_count(&models, &["messages"], false, None)
            .unwrap();

        let (_, chats, alias) = lookup(&stages[0]);
        assert_eq!(alias, COUNT_ALIAS);
        let kinds: Vec<&str> = chats
            .stages()
            .iter()
            .map(|s| match s {
                Stage::Match(_) => "match",
                Stage::Lookup { .. } => "lookup",
                Stage::Count { .. } => "count",
                Stage::Unset(_) => "unset",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["match", "lookup", "count", "match", "unset"]);
    }

    #[test]
    fn test_count_constraint_rejects_non_comparisons() {
        assert!(count_constraint(Operator::Like, 1).is_err());
        assert_eq!(count_constraint(Operator::Gte, 1).unwrap().len(), 3);
    }
}
