use std::{cell::RefCell, ffi::OsStr};

use crate::runtime::DEFAULT_BUDGET;

#[derive(Clone, Copy)]
struct Env {
    budget: u32,
}

thread_local! {
    /// Must only be mutated within `set_env`
    static ENV: RefCell<Option<Env>> = const { RefCell::new(None) };
}

pub fn init() {
    let value = Env {
        budget: var(NIB_BUDGET)
            .as_deref()
            .and_then(parse_budget)
            .unwrap_or(DEFAULT_BUDGET),
    };
    set_env(value);
}

const NIB_BUDGET: &str = "NIB_BUDGET";

/// Instruction budget for `run` when none is given on the command line.
pub fn default_budget() -> u32 {
    with_env(|env| env.budget)
}

/// Decimal or `0x` hex.
pub fn parse_budget(value: &str) -> Option<u32> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

fn set_env(value: Env) {
    ENV.with(|env| {
        let mut env = env.borrow_mut();
        assert!(
            env.is_none(),
            "tried to initialize environment state multiple times"
        );
        *env = Some(value);
    });
}

fn with_env<F, R>(callback: F) -> R
where
    F: Fn(&Env) -> R,
{
    ENV.with(|env| {
        let env = env.borrow();
        let env = env.unwrap_or_else(|| {
            panic!("tried to access environment state before initialization");
        });
        callback(&env)
    })
}

fn var(name: impl AsRef<OsStr>) -> Option<String> {
    std::env::var(name.as_ref()).ok()
}
