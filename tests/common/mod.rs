//! Shared blocks-world fixture for the integration tests.
//!
//! Three blocks on a table plus a single-gripper robot. Options carry a
//! continuous parameter whose initiation window is narrow, so uniform
//! sampling genuinely backtracks and learned Gaussian samplers genuinely
//! help.

use std::collections::{BTreeMap, BTreeSet};

use tamp_planner::env::Environment;
use tamp_planner::model::{
    BoxSpace, Classifier, GroundAtom, LiftedAtom, Nsrt, Object, ParameterizedOption, Predicate,
    Sampler, State, StripsOperator, Task, Type, Variable,
};
use tamp_planner::planning::Policy;
use tamp_planner::{Action, Error};

/// Install a test subscriber once so `RUST_LOG` surfaces pipeline logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Opcode for the pick action.
pub const OP_PICK: f64 = 1.0;
/// Opcode for the stack action.
pub const OP_STACK: f64 = 2.0;
/// Opcode for the put-on-table action.
pub const OP_PUT: f64 = 3.0;

/// The blocks-world environment: types, objects, predicates, and skills.
pub struct BlocksEnv {
    /// Robot type: `fingers` is 1.0 when the gripper is free.
    pub robot_type: Type,
    /// Block type: `id`, `pose` (column), `height` (level), `held`.
    pub block_type: Type,
    /// The robot.
    pub robot: Object,
    /// The three blocks.
    pub blocks: Vec<Object>,
}

impl BlocksEnv {
    pub fn new() -> Self {
        let robot_type = Type::new("robot", &["fingers"]);
        let block_type = Type::new("block", &["id", "pose", "height", "held"]);
        let robot = Object::new("robby", robot_type.clone());
        let blocks = (0..3)
            .map(|i| Object::new(&format!("b{i}"), block_type.clone()))
            .collect();
        Self {
            robot_type,
            block_type,
            robot,
            blocks,
        }
    }

    /// All three blocks on the table in separate columns, gripper free.
    pub fn initial_state(&self) -> State {
        let mut entries = vec![(self.robot.clone(), vec![1.0])];
        for (i, block) in self.blocks.iter().enumerate() {
            entries.push((block.clone(), vec![i as f64, i as f64, 0.0, 0.0]));
        }
        State::new(entries)
    }

    pub fn on(&self) -> Predicate {
        let block_type = self.block_type.clone();
        Predicate::new(
            "On",
            vec![block_type.clone(), block_type],
            Classifier::new(|s, o| {
                s.get(&o[0], "held") < 0.5
                    && s.get(&o[1], "held") < 0.5
                    && (s.get(&o[0], "pose") - s.get(&o[1], "pose")).abs() < 0.5
                    && (s.get(&o[0], "height") - s.get(&o[1], "height") - 1.0).abs() < 0.5
            }),
        )
    }

    pub fn on_table(&self) -> Predicate {
        Predicate::new(
            "OnTable",
            vec![self.block_type.clone()],
            Classifier::new(|s, o| {
                s.get(&o[0], "held") < 0.5 && s.get(&o[0], "height").abs() < 0.5
            }),
        )
    }

    pub fn clear(&self) -> Predicate {
        let block_type = self.block_type.clone();
        Predicate::new(
            "Clear",
            vec![block_type.clone()],
            Classifier::new(move |s, o| {
                if s.get(&o[0], "held") > 0.5 {
                    return false;
                }
                let pose = s.get(&o[0], "pose");
                let height = s.get(&o[0], "height");
                !s.objects_of_type(&block_type).iter().any(|other| {
                    other != &o[0]
                        && s.get(other, "held") < 0.5
                        && (s.get(other, "pose") - pose).abs() < 0.5
                        && (s.get(other, "height") - height - 1.0).abs() < 0.5
                })
            }),
        )
    }

    pub fn holding(&self) -> Predicate {
        Predicate::new(
            "Holding",
            vec![self.block_type.clone()],
            Classifier::new(|s, o| s.get(&o[0], "held") > 0.5),
        )
    }

    pub fn hand_empty(&self) -> Predicate {
        Predicate::new(
            "HandEmpty",
            vec![self.robot_type.clone()],
            Classifier::new(|s, o| s.get(&o[0], "fingers") > 0.5),
        )
    }

    pub fn predicate_set(&self) -> BTreeSet<Predicate> {
        BTreeSet::from([
            self.on(),
            self.on_table(),
            self.clear(),
            self.holding(),
            self.hand_empty(),
        ])
    }

    /// Pick a clear block off the table. The grip parameter must land in
    /// [0.4, 0.6] for initiation to succeed.
    pub fn pick_skill(&self) -> ParameterizedOption {
        let clear = self.clear();
        ParameterizedOption::new(
            "PickSkill",
            vec![self.robot_type.clone(), self.block_type.clone()],
            BoxSpace::new(vec![0.0], vec![1.0]),
            |s, o, p| {
                Action::new(vec![OP_PICK, s.get(&o[1], "id"), 0.0, p[0]])
            },
            move |s, o, p| {
                s.get(&o[0], "fingers") > 0.5
                    && s.get(&o[1], "height").abs() < 0.5
                    && s.get(&o[1], "held") < 0.5
                    && clear.holds(s, &[o[1].clone()])
                    && (p[0] - 0.5).abs() <= 0.1
            },
            |s, o, _| s.get(&o[1], "held") > 0.5,
        )
    }

    /// Stack the held block onto a clear target. The placement offset must
    /// be within 0.1 of center for initiation to succeed.
    pub fn stack_skill(&self) -> ParameterizedOption {
        let clear = self.clear();
        ParameterizedOption::new(
            "StackSkill",
            vec![
                self.robot_type.clone(),
                self.block_type.clone(),
                self.block_type.clone(),
            ],
            BoxSpace::new(vec![-1.0], vec![1.0]),
            |s, o, p| {
                Action::new(vec![OP_STACK, s.get(&o[1], "id"), s.get(&o[2], "id"), p[0]])
            },
            move |s, o, p| {
                s.get(&o[1], "held") > 0.5
                    && clear.holds(s, &[o[2].clone()])
                    && p[0].abs() <= 0.1
            },
            |s, o, _| {
                s.get(&o[1], "held") < 0.5
                    && (s.get(&o[1], "pose") - s.get(&o[2], "pose")).abs() < 0.5
                    && (s.get(&o[1], "height") - s.get(&o[2], "height") - 1.0).abs() < 0.5
            },
        )
    }

    /// Put the held block down in a fresh table column.
    pub fn put_on_table_skill(&self) -> ParameterizedOption {
        let block_type = self.block_type.clone();
        ParameterizedOption::new(
            "PutOnTableSkill",
            vec![self.robot_type.clone(), self.block_type.clone()],
            BoxSpace::new(vec![0.0], vec![1.0]),
            move |s, o, _p| {
                let free_column = s
                    .objects_of_type(&block_type)
                    .iter()
                    .map(|b| s.get(b, "pose"))
                    .fold(0.0_f64, f64::max)
                    + 1.0;
                Action::new(vec![OP_PUT, s.get(&o[1], "id"), free_column, 0.0])
            },
            |s, o, _| s.get(&o[1], "held") > 0.5,
            |s, o, _| s.get(&o[1], "held") < 0.5 && s.get(&o[1], "height").abs() < 0.5,
        )
    }

    fn find_block(&self, state: &State, id: f64) -> Option<Object> {
        self.blocks
            .iter()
            .find(|b| state.contains(b) && (state.get(b, "id") - id).abs() < 0.5)
            .cloned()
    }
}

impl Environment for BlocksEnv {
    fn simulate(&self, state: &State, action: &Action) -> State {
        let mut next = state.clone();
        let opcode = action.arr[0].round();
        if (opcode - OP_PICK).abs() < 0.5 {
            if let Some(block) = self.find_block(state, action.arr[1]) {
                next.set(&block, "held", 1.0);
                next.set(&self.robot, "fingers", 0.0);
            }
        } else if (opcode - OP_STACK).abs() < 0.5 {
            if let (Some(block), Some(target)) = (
                self.find_block(state, action.arr[1]),
                self.find_block(state, action.arr[2]),
            ) {
                next.set(&block, "pose", state.get(&target, "pose"));
                next.set(&block, "height", state.get(&target, "height") + 1.0);
                next.set(&block, "held", 0.0);
                next.set(&self.robot, "fingers", 1.0);
            }
        } else if (opcode - OP_PUT).abs() < 0.5 {
            if let Some(block) = self.find_block(state, action.arr[1]) {
                next.set(&block, "pose", action.arr[2]);
                next.set(&block, "height", 0.0);
                next.set(&block, "held", 0.0);
                next.set(&self.robot, "fingers", 1.0);
            }
        }
        next
    }

    fn predicates(&self) -> BTreeSet<Predicate> {
        self.predicate_set()
    }

    fn types(&self) -> Vec<Type> {
        vec![self.robot_type.clone(), self.block_type.clone()]
    }

    fn options(&self) -> Vec<ParameterizedOption> {
        vec![
            self.pick_skill(),
            self.stack_skill(),
            self.put_on_table_skill(),
        ]
    }

    fn action_space(&self) -> BoxSpace {
        BoxSpace::new(vec![0.0, 0.0, -10.0, -1.0], vec![3.0, 10.0, 10.0, 1.0])
    }

    fn train_tasks(&self) -> Vec<Task> {
        let on = self.on();
        vec![Task::new(
            self.initial_state(),
            BTreeSet::from([GroundAtom::new(
                on,
                vec![self.blocks[1].clone(), self.blocks[0].clone()],
            )]),
        )]
    }

    fn test_tasks(&self) -> Vec<Task> {
        let on = self.on();
        vec![Task::new(
            self.initial_state(),
            BTreeSet::from([
                GroundAtom::new(
                    on.clone(),
                    vec![self.blocks[1].clone(), self.blocks[0].clone()],
                ),
                GroundAtom::new(on, vec![self.blocks[2].clone(), self.blocks[1].clone()]),
            ]),
        )]
    }
}

/// Ground-truth samplers: parameters in the middle of each skill's
/// initiation window.
pub fn oracle_samplers() -> BTreeMap<String, Sampler> {
    BTreeMap::from([
        (
            "PickSkill".to_string(),
            Sampler::new(|_, _, _| vec![0.5]),
        ),
        (
            "StackSkill".to_string(),
            Sampler::new(|_, _, _| vec![0.0]),
        ),
        (
            "PutOnTableSkill".to_string(),
            Sampler::new(|_, _, _| vec![0.5]),
        ),
    ])
}

/// Hand-written operator set matching the environment dynamics.
pub fn oracle_nsrts(env: &BlocksEnv) -> Vec<Nsrt> {
    let samplers = oracle_samplers();
    let on = env.on();
    let on_table = env.on_table();
    let clear = env.clear();
    let holding = env.holding();
    let hand_empty = env.hand_empty();

    let r = Variable::new("?robot", env.robot_type.clone());
    let b = Variable::new("?block", env.block_type.clone());
    let t = Variable::new("?target", env.block_type.clone());

    let pick = Nsrt::new(
        StripsOperator::new(
            "Pick",
            vec![r.clone(), b.clone()],
            BTreeSet::from([
                LiftedAtom::new(hand_empty.clone(), vec![r.clone()]),
                LiftedAtom::new(clear.clone(), vec![b.clone()]),
                LiftedAtom::new(on_table.clone(), vec![b.clone()]),
            ]),
            BTreeSet::from([LiftedAtom::new(holding.clone(), vec![b.clone()])]),
            BTreeSet::from([
                LiftedAtom::new(hand_empty.clone(), vec![r.clone()]),
                LiftedAtom::new(clear.clone(), vec![b.clone()]),
                LiftedAtom::new(on_table.clone(), vec![b.clone()]),
            ]),
            BTreeSet::new(),
        ),
        env.pick_skill(),
        vec![r.clone(), b.clone()],
        samplers["PickSkill"].clone(),
    );

    let stack = Nsrt::new(
        StripsOperator::new(
            "Stack",
            vec![r.clone(), b.clone(), t.clone()],
            BTreeSet::from([
                LiftedAtom::new(holding.clone(), vec![b.clone()]),
                LiftedAtom::new(clear.clone(), vec![t.clone()]),
            ]),
            BTreeSet::from([
                LiftedAtom::new(on.clone(), vec![b.clone(), t.clone()]),
                LiftedAtom::new(clear.clone(), vec![b.clone()]),
                LiftedAtom::new(hand_empty.clone(), vec![r.clone()]),
            ]),
            BTreeSet::from([
                LiftedAtom::new(holding.clone(), vec![b.clone()]),
                LiftedAtom::new(clear.clone(), vec![t.clone()]),
            ]),
            BTreeSet::new(),
        ),
        env.stack_skill(),
        vec![r.clone(), b.clone(), t.clone()],
        samplers["StackSkill"].clone(),
    );

    let put_on_table = Nsrt::new(
        StripsOperator::new(
            "PutOnTable",
            vec![r.clone(), b.clone()],
            BTreeSet::from([LiftedAtom::new(holding.clone(), vec![b.clone()])]),
            BTreeSet::from([
                LiftedAtom::new(on_table, vec![b.clone()]),
                LiftedAtom::new(clear, vec![b.clone()]),
                LiftedAtom::new(hand_empty, vec![r.clone()]),
            ]),
            BTreeSet::from([LiftedAtom::new(holding, vec![b.clone()])]),
            BTreeSet::new(),
        ),
        env.put_on_table_skill(),
        vec![r, b],
        samplers["PutOnTableSkill"].clone(),
    );

    vec![pick, stack, put_on_table]
}

/// Drive a policy through the simulator until it reports exhaustion.
/// Returns the visited states and executed (option-tagged) actions.
pub fn execute_policy(
    policy: &mut Policy,
    env: &BlocksEnv,
    init: &State,
) -> (Vec<State>, Vec<Action>) {
    let mut states = vec![init.clone()];
    let mut actions = Vec::new();
    for _ in 0..50 {
        let state = states.last().expect("nonempty").clone();
        match policy.next_action(&state) {
            Ok(action) => {
                states.push(env.simulate(&state, &action));
                actions.push(action);
            }
            Err(Error::PlanExhausted) => break,
            Err(other) => panic!("unexpected execution failure: {other}"),
        }
    }
    (states, actions)
}
