//! Interactive topology collection
//!
//! Questions go to `output`, answers come one per line from `input`. Special
//! agents are collected first, then each meta agent with its sub agents.

use std::io::{BufRead, Write};

use crate::agent::{Agent, MetaAgent};
use crate::error::SynodError;
use crate::hierarchy::Hierarchy;

/// Largest agent count accepted for any one level
pub const MAX_AGENTS: usize = 1024;

/// Ask `question` and return the answer without its line ending
pub fn ask_line<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> Result<String, SynodError> {
    write!(output, "{question}")?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(SynodError::ConfigInput(format!(
            "input ended before answering {:?}",
            question.trim()
        )));
    }
    Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Ask a yes/no question; only `y` (either case) counts as yes
pub fn confirm<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> Result<bool, SynodError> {
    let answer = ask_line(input, output, question)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

fn ask_count<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> Result<usize, SynodError> {
    let answer = ask_line(input, output, question)?;
    let count = answer.trim().parse::<usize>().map_err(|_| {
        SynodError::ConfigInput(format!("expected a number of agents, got {answer:?}"))
    })?;
    if count > MAX_AGENTS {
        return Err(SynodError::ConfigInput(format!(
            "at most {MAX_AGENTS} agents per level, got {count}"
        )));
    }
    Ok(count)
}

fn ask_name<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> Result<String, SynodError> {
    let name = ask_line(input, output, question)?;
    if name.trim().is_empty() {
        return Err(SynodError::ConfigInput("agent name must not be empty".into()));
    }
    Ok(name)
}

/// Collect a whole hierarchy
pub fn collect_hierarchy<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
) -> Result<Hierarchy, SynodError> {
    let mut hierarchy = Hierarchy::new();

    let specials = ask_count(
        input,
        output,
        "How many special-purpose agents would you like to create? ",
    )?;
    for i in 0..specials {
        let name = ask_name(input, output, &format!("Enter name for Special Agent {}: ", i + 1))?;
        let role = ask_line(
            input,
            output,
            &format!("Enter role for Special Agent {name} (e.g., 'Summarize', 'Critically Evaluate'): "),
        )?;
        hierarchy.special_agents.push(Agent::new(name, role));
    }

    let metas = ask_count(input, output, "How many meta-agents would you like to create? ")?;
    for i in 0..metas {
        let meta_name = ask_name(input, output, &format!("Enter name for Meta-Agent {}: ", i + 1))?;
        let meta_role = ask_line(input, output, &format!("Enter role for Meta-Agent {}: ", i + 1))?;

        let subs = ask_count(
            input,
            output,
            &format!("How many sub-agents for Meta-Agent {meta_name}? "),
        )?;
        let mut meta = MetaAgent::new(meta_name.clone(), meta_role, Vec::new());
        for j in 0..subs {
            let name = ask_name(
                input,
                output,
                &format!("Enter name for Sub-Agent {} of Meta-Agent {meta_name}: ", j + 1),
            )?;
            let role = ask_line(input, output, &format!("Enter role for Sub-Agent {name}: "))?;
            meta.add_child(Agent::new(name, role));
        }
        hierarchy.meta_agents.push(meta);
    }

    Ok(hierarchy)
}
