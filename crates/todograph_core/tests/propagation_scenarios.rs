use time::macros::datetime;
use time::OffsetDateTime;
use todograph_core::{
    CascadeFailureReason, CascadeRule, EdgeChanges, GateReason, GraphStore, InMemoryGraphStore,
    MutationError, NewTodo, Relation, StepOutcome, TodoEdges, TodoId, TodoListQuery, TodoPatch,
    UpdateCoordinator, ViolationField,
};
use uuid::Uuid;

type Coordinator = UpdateCoordinator<InMemoryGraphStore>;

fn setup() -> Coordinator {
    UpdateCoordinator::new(InMemoryGraphStore::new())
}

fn create(
    coordinator: &mut Coordinator,
    name: &str,
    start: OffsetDateTime,
    end: OffsetDateTime,
    edges: TodoEdges,
) -> TodoId {
    coordinator
        .create_todo(NewTodo::new(Uuid::nil(), name, start, end), edges)
        .unwrap()
        .id
}

fn dates(coordinator: &Coordinator, id: TodoId) -> (OffsetDateTime, OffsetDateTime) {
    let todo = coordinator.store().get_todo(id).unwrap();
    (todo.start_date, todo.end_date)
}

fn set_end(end: OffsetDateTime) -> TodoPatch {
    TodoPatch {
        end_date: Some(end),
        ..TodoPatch::default()
    }
}

fn set_start(start: OffsetDateTime) -> TodoPatch {
    TodoPatch {
        start_date: Some(start),
        ..TodoPatch::default()
    }
}

/// Checks the structural and date invariants on every todo in the graph.
fn assert_graph_invariants(coordinator: &Coordinator) {
    let store = coordinator.store();
    for todo in coordinator.list_todos(&TodoListQuery::default()) {
        let name = &todo.name;
        assert!(todo.end_date >= todo.start_date, "{name}: end before start");

        let dependencies = store.dependencies(todo.id).unwrap();
        let dependents = store.dependents(todo.id).unwrap();
        let children = store.children(todo.id).unwrap();
        let parents = store.parents(todo.id).unwrap();
        assert!(
            dependencies.iter().all(|id| !dependents.contains(id)),
            "{name}: dependency is also a dependent"
        );
        assert!(
            children.iter().all(|id| !parents.contains(id)),
            "{name}: child is also a parent"
        );
        assert!(parents.len() <= 1, "{name}: more than one parent");

        for id in &dependencies {
            let dependency = store.get_todo(*id).unwrap();
            assert!(
                todo.start_date >= dependency.end_date,
                "{name}: starts before dependency {} ends",
                dependency.name
            );
        }
        for id in &children {
            let child = store.get_todo(*id).unwrap();
            assert!(
                todo.end_date >= child.end_date,
                "{name}: ends before child {} ends",
                child.name
            );
        }
    }
}

#[test]
fn extending_dependency_shifts_overlapped_dependent() {
    let mut coordinator = setup();
    let task = create(
        &mut coordinator,
        "task",
        datetime!(2022-01-01 0:00 UTC),
        datetime!(2022-01-10 0:00 UTC),
        TodoEdges::default(),
    );
    let dependent = create(
        &mut coordinator,
        "dependent",
        datetime!(2022-01-12 0:00 UTC),
        datetime!(2022-01-20 0:00 UTC),
        TodoEdges::default().with(Relation::Dependencies, task),
    );

    let report = coordinator
        .update_todo(
            task,
            &set_end(datetime!(2022-01-15 0:00 UTC)),
            &EdgeChanges::default(),
        )
        .unwrap();

    assert_eq!(
        dates(&coordinator, dependent),
        (datetime!(2022-01-17 0:00 UTC), datetime!(2022-01-25 0:00 UTC))
    );
    assert_eq!(report.updated_todo_ids, vec![task, dependent]);
    assert!(report.is_complete());
    assert_eq!(report.trace.len(), 1);
    assert_eq!(report.trace[0].rule, CascadeRule::ShiftDependent);
    assert_eq!(report.trace[0].delta_secs, 5 * 86_400);
    assert_graph_invariants(&coordinator);
}

#[test]
fn sub_day_end_change_does_not_move_dependent() {
    let mut coordinator = setup();
    let task = create(
        &mut coordinator,
        "task",
        datetime!(2022-01-01 0:00 UTC),
        datetime!(2022-01-10 0:00 UTC),
        TodoEdges::default(),
    );
    let dependent = create(
        &mut coordinator,
        "dependent",
        datetime!(2022-01-12 0:00 UTC),
        datetime!(2022-01-20 0:00 UTC),
        TodoEdges::default().with(Relation::Dependencies, task),
    );

    let report = coordinator
        .update_todo(
            task,
            &set_end(datetime!(2022-01-10 23:00 UTC)),
            &EdgeChanges::default(),
        )
        .unwrap();

    assert_eq!(
        dates(&coordinator, dependent),
        (datetime!(2022-01-12 0:00 UTC), datetime!(2022-01-20 0:00 UTC))
    );
    assert_eq!(report.updated_todo_ids, vec![task]);
    assert!(report.trace.is_empty());
    assert_graph_invariants(&coordinator);
}

#[test]
fn end_delta_debounce_boundary_23h_vs_25h() {
    let mut coordinator = setup();
    let task = create(
        &mut coordinator,
        "task",
        datetime!(2022-01-01 0:00 UTC),
        datetime!(2022-01-10 0:00 UTC),
        TodoEdges::default(),
    );
    let dependent = create(
        &mut coordinator,
        "dependent",
        datetime!(2022-01-10 0:00 UTC),
        datetime!(2022-01-12 0:00 UTC),
        TodoEdges::default().with(Relation::Dependencies, task),
    );

    coordinator
        .update_todo(
            task,
            &set_end(datetime!(2022-01-10 23:00 UTC)),
            &EdgeChanges::default(),
        )
        .unwrap();
    assert_eq!(
        dates(&coordinator, dependent),
        (datetime!(2022-01-10 0:00 UTC), datetime!(2022-01-12 0:00 UTC))
    );

    coordinator
        .update_todo(
            task,
            &set_end(datetime!(2022-01-10 0:00 UTC)),
            &EdgeChanges::default(),
        )
        .unwrap();
    let report = coordinator
        .update_todo(
            task,
            &set_end(datetime!(2022-01-11 1:00 UTC)),
            &EdgeChanges::default(),
        )
        .unwrap();
    assert_eq!(
        dates(&coordinator, dependent),
        (datetime!(2022-01-11 1:00 UTC), datetime!(2022-01-13 1:00 UTC))
    );
    assert_eq!(report.cascaded_ids().collect::<Vec<_>>(), vec![dependent]);
    assert_graph_invariants(&coordinator);
}

#[test]
fn start_delta_debounce_boundary_23h_vs_25h() {
    let mut coordinator = setup();
    let parent = create(
        &mut coordinator,
        "parent",
        datetime!(2022-01-01 0:00 UTC),
        datetime!(2022-01-10 0:00 UTC),
        TodoEdges::default(),
    );
    let child = create(
        &mut coordinator,
        "child",
        datetime!(2022-01-03 0:00 UTC),
        datetime!(2022-01-05 0:00 UTC),
        TodoEdges::default().with(Relation::Parents, parent),
    );

    coordinator
        .update_todo(
            parent,
            &set_start(datetime!(2022-01-01 23:00 UTC)),
            &EdgeChanges::default(),
        )
        .unwrap();
    assert_eq!(
        dates(&coordinator, parent),
        (datetime!(2022-01-01 23:00 UTC), datetime!(2022-01-10 0:00 UTC))
    );
    assert_eq!(
        dates(&coordinator, child),
        (datetime!(2022-01-03 0:00 UTC), datetime!(2022-01-05 0:00 UTC))
    );

    coordinator
        .update_todo(
            parent,
            &set_start(datetime!(2022-01-03 0:00 UTC)),
            &EdgeChanges::default(),
        )
        .unwrap();
    assert_eq!(
        dates(&coordinator, parent),
        (datetime!(2022-01-03 0:00 UTC), datetime!(2022-01-11 1:00 UTC))
    );
    assert_eq!(
        dates(&coordinator, child),
        (datetime!(2022-01-04 1:00 UTC), datetime!(2022-01-06 1:00 UTC))
    );
    assert_graph_invariants(&coordinator);
}

#[test]
fn moving_parent_start_shifts_child_and_keeps_later_parent_end() {
    let mut coordinator = setup();
    let parent = create(
        &mut coordinator,
        "parent",
        datetime!(2022-01-01 0:00 UTC),
        datetime!(2022-01-10 0:00 UTC),
        TodoEdges::default(),
    );
    let child = create(
        &mut coordinator,
        "child",
        datetime!(2022-01-02 0:00 UTC),
        datetime!(2022-01-05 0:00 UTC),
        TodoEdges::default().with(Relation::Parents, parent),
    );

    let report = coordinator
        .update_todo(
            parent,
            &set_start(datetime!(2022-01-09 0:00 UTC)),
            &EdgeChanges::default(),
        )
        .unwrap();

    assert_eq!(
        dates(&coordinator, parent),
        (datetime!(2022-01-09 0:00 UTC), datetime!(2022-01-18 0:00 UTC))
    );
    assert_eq!(
        dates(&coordinator, child),
        (datetime!(2022-01-10 0:00 UTC), datetime!(2022-01-13 0:00 UTC))
    );
    let outcomes: Vec<_> = report
        .trace
        .iter()
        .map(|line| (line.rule, line.outcome.clone()))
        .collect();
    assert!(matches!(
        outcomes.as_slice(),
        [
            (CascadeRule::ShiftChild, StepOutcome::Applied { .. }),
            (
                CascadeRule::PullParentEnd,
                StepOutcome::Gated {
                    reason: GateReason::ParentEndsLater
                }
            ),
        ]
    ));
    assert_graph_invariants(&coordinator);
}

#[test]
fn shifted_child_pulls_parent_end_when_it_outgrows_it() {
    let mut coordinator = setup();
    let parent = create(
        &mut coordinator,
        "parent",
        datetime!(2022-01-01 0:00 UTC),
        datetime!(2022-01-10 0:00 UTC),
        TodoEdges::default(),
    );
    let child = create(
        &mut coordinator,
        "child",
        datetime!(2022-01-02 0:00 UTC),
        datetime!(2022-01-05 0:00 UTC),
        TodoEdges::default().with(Relation::Parents, parent),
    );

    let report = coordinator
        .update_todo(
            parent,
            &TodoPatch {
                start_date: Some(datetime!(2022-01-09 0:00 UTC)),
                end_date: Some(datetime!(2022-01-09 0:00 UTC)),
                ..TodoPatch::default()
            },
            &EdgeChanges::default(),
        )
        .unwrap();

    assert_eq!(
        dates(&coordinator, child),
        (datetime!(2022-01-10 0:00 UTC), datetime!(2022-01-13 0:00 UTC))
    );
    assert_eq!(
        dates(&coordinator, parent),
        (datetime!(2022-01-09 0:00 UTC), datetime!(2022-01-13 0:00 UTC))
    );
    assert_eq!(report.updated_todo_ids, vec![parent, child]);
    assert!(report.is_complete());
    assert_graph_invariants(&coordinator);
}

#[test]
fn self_dependency_is_rejected_without_commit() {
    let mut coordinator = setup();
    let task = create(
        &mut coordinator,
        "task",
        datetime!(2022-01-01 0:00 UTC),
        datetime!(2022-01-10 0:00 UTC),
        TodoEdges::default(),
    );

    let err = coordinator
        .update_todo(
            task,
            &set_end(datetime!(2022-01-12 0:00 UTC)),
            &EdgeChanges::default().add(Relation::Dependencies, task),
        )
        .unwrap_err();

    let MutationError::Rejected(result) = err else {
        panic!("expected rejection, got {err:?}");
    };
    assert!(!result.ok);
    assert!(result.has_violation(ViolationField::Dependencies));
    assert!(coordinator.store().dependencies(task).unwrap().is_empty());
    assert_eq!(
        dates(&coordinator, task),
        (datetime!(2022-01-01 0:00 UTC), datetime!(2022-01-10 0:00 UTC))
    );
    assert_graph_invariants(&coordinator);
}

#[test]
fn done_status_requires_done_dependencies() {
    let mut coordinator = setup();
    let blocker = create(
        &mut coordinator,
        "write draft",
        datetime!(2022-01-01 0:00 UTC),
        datetime!(2022-01-05 0:00 UTC),
        TodoEdges::default(),
    );
    let task = create(
        &mut coordinator,
        "publish",
        datetime!(2022-01-06 0:00 UTC),
        datetime!(2022-01-10 0:00 UTC),
        TodoEdges::default().with(Relation::Dependencies, blocker),
    );
    let done = TodoPatch {
        status: Some(true),
        ..TodoPatch::default()
    };

    let err = coordinator
        .update_todo(task, &done, &EdgeChanges::default())
        .unwrap_err();
    let MutationError::Rejected(result) = err else {
        panic!("expected rejection, got {err:?}");
    };
    let messages: Vec<_> = result.violations_for(ViolationField::Status).collect();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].message.contains("write draft"));
    assert!(!coordinator.store().get_todo(task).unwrap().status);

    coordinator
        .update_todo(blocker, &done, &EdgeChanges::default())
        .unwrap();
    coordinator
        .update_todo(task, &done, &EdgeChanges::default())
        .unwrap();
    assert!(coordinator.store().get_todo(task).unwrap().status);
    assert_graph_invariants(&coordinator);
}

#[test]
fn no_op_update_produces_no_cascade() {
    let mut coordinator = setup();
    let task = create(
        &mut coordinator,
        "task",
        datetime!(2022-01-01 0:00 UTC),
        datetime!(2022-01-10 0:00 UTC),
        TodoEdges::default(),
    );
    create(
        &mut coordinator,
        "dependent",
        datetime!(2022-01-12 0:00 UTC),
        datetime!(2022-01-20 0:00 UTC),
        TodoEdges::default().with(Relation::Dependencies, task),
    );
    let same = TodoPatch {
        name: Some("task".to_string()),
        start_date: Some(datetime!(2022-01-01 0:00 UTC)),
        end_date: Some(datetime!(2022-01-10 0:00 UTC)),
        ..TodoPatch::default()
    };

    for _ in 0..2 {
        let report = coordinator
            .update_todo(task, &same, &EdgeChanges::default())
            .unwrap();
        assert!(report.is_noop());
        assert!(report.is_complete());
    }
    assert_graph_invariants(&coordinator);
}

#[test]
fn failing_cascade_step_stops_and_keeps_earlier_commits() {
    let mut coordinator = setup();
    let blocker = create(
        &mut coordinator,
        "blocker",
        datetime!(2022-01-01 0:00 UTC),
        datetime!(2022-01-03 0:00 UTC),
        TodoEdges::default(),
    );
    let parent = create(
        &mut coordinator,
        "parent",
        datetime!(2022-01-01 0:00 UTC),
        datetime!(2022-01-20 0:00 UTC),
        TodoEdges::default(),
    );
    let free_child = create(
        &mut coordinator,
        "free child",
        datetime!(2022-01-05 0:00 UTC),
        datetime!(2022-01-07 0:00 UTC),
        TodoEdges::default().with(Relation::Parents, parent),
    );
    let blocked_child = create(
        &mut coordinator,
        "blocked child",
        datetime!(2022-01-04 0:00 UTC),
        datetime!(2022-01-06 0:00 UTC),
        TodoEdges::default()
            .with(Relation::Parents, parent)
            .with(Relation::Dependencies, blocker),
    );

    let report = coordinator
        .update_todo(
            parent,
            &set_start(datetime!(2021-12-30 0:00 UTC)),
            &EdgeChanges::default(),
        )
        .unwrap();

    assert_eq!(report.updated_todo_ids, vec![parent, free_child]);
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.todo_id, blocked_child);
    assert_eq!(failure.source, parent);
    assert_eq!(failure.rule, CascadeRule::ShiftChild);
    assert!(matches!(failure.reason, CascadeFailureReason::Rejected { .. }));
    assert!(failure
        .violations()
        .iter()
        .any(|violation| violation.field == ViolationField::StartDate
            && violation.message.contains("blocker")));

    assert_eq!(
        dates(&coordinator, parent),
        (datetime!(2021-12-30 0:00 UTC), datetime!(2022-01-18 0:00 UTC))
    );
    assert_eq!(
        dates(&coordinator, free_child),
        (datetime!(2022-01-03 0:00 UTC), datetime!(2022-01-05 0:00 UTC))
    );
    assert_eq!(
        dates(&coordinator, blocked_child),
        (datetime!(2022-01-04 0:00 UTC), datetime!(2022-01-06 0:00 UTC))
    );
    assert!(matches!(
        report.trace.last().map(|line| &line.outcome),
        Some(StepOutcome::Failed)
    ));
    assert_graph_invariants(&coordinator);
}

#[test]
fn dependent_moves_only_after_its_latest_dependency() {
    let mut coordinator = setup();
    let early = create(
        &mut coordinator,
        "early",
        datetime!(2022-01-01 0:00 UTC),
        datetime!(2022-01-05 0:00 UTC),
        TodoEdges::default(),
    );
    let late = create(
        &mut coordinator,
        "late",
        datetime!(2022-01-01 0:00 UTC),
        datetime!(2022-01-08 0:00 UTC),
        TodoEdges::default(),
    );
    let dependent = create(
        &mut coordinator,
        "dependent",
        datetime!(2022-01-09 0:00 UTC),
        datetime!(2022-01-12 0:00 UTC),
        TodoEdges::default()
            .with(Relation::Dependencies, early)
            .with(Relation::Dependencies, late),
    );

    let report = coordinator
        .update_todo(
            early,
            &set_end(datetime!(2022-01-07 0:00 UTC)),
            &EdgeChanges::default(),
        )
        .unwrap();
    assert!(matches!(
        report.trace[0].outcome,
        StepOutcome::Gated {
            reason: GateReason::NotLatestDependency
        }
    ));

    coordinator
        .update_todo(
            late,
            &set_end(datetime!(2022-01-10 0:00 UTC)),
            &EdgeChanges::default(),
        )
        .unwrap();
    assert_eq!(
        dates(&coordinator, dependent),
        (datetime!(2022-01-11 0:00 UTC), datetime!(2022-01-14 0:00 UTC))
    );
    assert_graph_invariants(&coordinator);
}

#[test]
fn cascade_reaches_dependents_of_shifted_children() {
    let mut coordinator = setup();
    let parent = create(
        &mut coordinator,
        "parent",
        datetime!(2022-01-01 0:00 UTC),
        datetime!(2022-01-10 0:00 UTC),
        TodoEdges::default(),
    );
    let child = create(
        &mut coordinator,
        "child",
        datetime!(2022-01-01 0:00 UTC),
        datetime!(2022-01-04 0:00 UTC),
        TodoEdges::default().with(Relation::Parents, parent),
    );
    let follow_up = create(
        &mut coordinator,
        "follow up",
        datetime!(2022-01-04 0:00 UTC),
        datetime!(2022-01-06 0:00 UTC),
        TodoEdges::default().with(Relation::Dependencies, child),
    );

    let report = coordinator
        .update_todo(
            parent,
            &set_start(datetime!(2022-01-03 0:00 UTC)),
            &EdgeChanges::default(),
        )
        .unwrap();

    assert_eq!(
        dates(&coordinator, follow_up),
        (datetime!(2022-01-06 0:00 UTC), datetime!(2022-01-08 0:00 UTC))
    );
    assert_eq!(report.updated_todo_ids, vec![parent, child, follow_up]);
    assert_graph_invariants(&coordinator);
}

#[test]
fn moving_parent_start_earlier_shifts_whole_subtree() {
    let mut coordinator = setup();
    let parent = create(
        &mut coordinator,
        "parent",
        datetime!(2022-01-01 0:00 UTC),
        datetime!(2022-01-10 0:00 UTC),
        TodoEdges::default(),
    );
    let child = create(
        &mut coordinator,
        "child",
        datetime!(2022-01-02 0:00 UTC),
        datetime!(2022-01-09 0:00 UTC),
        TodoEdges::default().with(Relation::Parents, parent),
    );
    let grandchild = create(
        &mut coordinator,
        "grandchild",
        datetime!(2022-01-03 0:00 UTC),
        datetime!(2022-01-09 0:00 UTC),
        TodoEdges::default().with(Relation::Parents, child),
    );

    let report = coordinator
        .update_todo(
            parent,
            &set_start(datetime!(2021-12-29 0:00 UTC)),
            &EdgeChanges::default(),
        )
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.updated_todo_ids, vec![parent, child, grandchild]);
    assert_eq!(
        dates(&coordinator, parent),
        (datetime!(2021-12-29 0:00 UTC), datetime!(2022-01-07 0:00 UTC))
    );
    assert_eq!(
        dates(&coordinator, child),
        (datetime!(2021-12-30 0:00 UTC), datetime!(2022-01-06 0:00 UTC))
    );
    assert_eq!(
        dates(&coordinator, grandchild),
        (datetime!(2021-12-31 0:00 UTC), datetime!(2022-01-06 0:00 UTC))
    );
    assert_graph_invariants(&coordinator);
}

#[test]
fn parent_end_follows_children_reached_at_different_depths() {
    let mut coordinator = setup();
    let origin = create(
        &mut coordinator,
        "origin",
        datetime!(2022-01-01 0:00 UTC),
        datetime!(2022-01-10 0:00 UTC),
        TodoEdges::default(),
    );
    let parent = create(
        &mut coordinator,
        "parent",
        datetime!(2022-01-01 0:00 UTC),
        datetime!(2022-01-20 0:00 UTC),
        TodoEdges::default(),
    );
    let near_child = create(
        &mut coordinator,
        "near child",
        datetime!(2022-01-12 0:00 UTC),
        datetime!(2022-01-19 0:00 UTC),
        TodoEdges::default()
            .with(Relation::Parents, parent)
            .with(Relation::Dependencies, origin),
    );
    let relay = create(
        &mut coordinator,
        "relay",
        datetime!(2022-01-11 0:00 UTC),
        datetime!(2022-01-15 0:00 UTC),
        TodoEdges::default().with(Relation::Dependencies, origin),
    );
    let far_child = create(
        &mut coordinator,
        "far child",
        datetime!(2022-01-16 0:00 UTC),
        datetime!(2022-01-20 0:00 UTC),
        TodoEdges::default()
            .with(Relation::Parents, parent)
            .with(Relation::Dependencies, relay),
    );

    let report = coordinator
        .update_todo(
            origin,
            &set_end(datetime!(2022-01-15 0:00 UTC)),
            &EdgeChanges::default(),
        )
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(
        dates(&coordinator, near_child),
        (datetime!(2022-01-17 0:00 UTC), datetime!(2022-01-24 0:00 UTC))
    );
    assert_eq!(
        dates(&coordinator, far_child),
        (datetime!(2022-01-21 0:00 UTC), datetime!(2022-01-25 0:00 UTC))
    );
    assert_eq!(
        dates(&coordinator, parent),
        (datetime!(2022-01-01 0:00 UTC), datetime!(2022-01-25 0:00 UTC))
    );
    let pulls: Vec<_> = report
        .trace
        .iter()
        .filter(|line| line.rule == CascadeRule::PullParentEnd && line.target == parent)
        .map(|line| (line.source, line.outcome.clone()))
        .collect();
    assert!(matches!(
        pulls.as_slice(),
        [
            (first, StepOutcome::Applied { .. }),
            (second, StepOutcome::Applied { .. }),
        ] if *first == near_child && *second == far_child
    ));
    assert_graph_invariants(&coordinator);
}
