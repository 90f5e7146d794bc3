use crate::channels::Message;
use crate::error::KernelError;
use crate::kernel::{HookResult, Hooks, Module, ModuleContext};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

static DICE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]+)[dD]([0-9]+)").unwrap());

const MAX_DICE: u32 = 10;
const MIN_SIDES: u32 = 2;
const MAX_SIDES: u32 = 1000;

/// `NdM` dice rolls
pub struct Dice;

/// Number of dice and sides from the first `NdM` in `text`, if within limits
pub fn parse_roll(text: &str) -> Option<(u32, u32)> {
    let caps = DICE_PATTERN.captures(text)?;
    let times: u32 = caps[1].parse().ok()?;
    let sides: u32 = caps[2].parse().ok()?;

    if !(1..=MAX_DICE).contains(&times) || !(MIN_SIDES..=MAX_SIDES).contains(&sides) {
        return None;
    }
    Some((times, sides))
}

pub fn roll<R: Rng>(rng: &mut R, times: u32, sides: u32) -> Vec<u32> {
    (0..times).map(|_| rng.gen_range(1..=sides)).collect()
}

#[async_trait]
impl Module for Dice {
    fn name(&self) -> &'static str {
        "dice"
    }

    fn install(&self) -> Hooks {
        Hooks::none().with_mention()
    }

    async fn mention_hook(
        &self,
        ctx: &ModuleContext<'_>,
        msg: &Message,
    ) -> Result<HookResult, KernelError> {
        let Some((times, sides)) = msg.text.as_deref().and_then(parse_roll) else {
            return Ok(HookResult::Pass);
        };

        let results = roll(&mut rand::thread_rng(), times, sides);
        let line = results
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        log::debug!("[dice] {}d{} -> {}", times, sides, line);

        ctx.reply(msg, &format!("I rolled: {}", line)).await?;
        Ok(HookResult::handled())
    }
}
