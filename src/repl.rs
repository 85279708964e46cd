use crate::models::{preview, Outcome, TextStage};
use crate::workflow::{WorkflowController, WorkflowError};
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Line-oriented front end. Holds no workflow state of its own: every command
/// maps to a controller action or view, and all gating happens in the core.
/// Remote actions run as background tasks so the busy guard is observable.
pub async fn run(controller: Arc<WorkflowController>) -> anyhow::Result<()> {
    println!("prompt studio — type 'help' for commands");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, rest) = match line.split_once(' ') {
            Some((c, r)) => (c, r.trim()),
            None => (line, ""),
        };

        match command {
            "" => {}
            "help" => print_help(),
            "quit" | "exit" => break,
            "show" => print_state(&controller),

            "prompt" => {
                controller.set_prompt(rest);
                println!("prompt set; downstream artifacts cleared");
            }

            "analyze" => {
                let ctl = controller.clone();
                tokio::spawn(async move {
                    if report("analyze", ctl.analyze().await) {
                        if let Some(analysis) = ctl.text_view().analysis {
                            println!(
                                "analysis:\n{}",
                                serde_json::to_string_pretty(&analysis).unwrap_or_default()
                            );
                        }
                    }
                });
            }

            "enhance" => {
                let ctl = controller.clone();
                tokio::spawn(async move {
                    if report("enhance", ctl.enhance().await) {
                        match ctl.text_view().enhanced.as_deref() {
                            Some("") => {
                                println!("enhancement succeeded but returned an empty suggestion")
                            }
                            Some(text) => println!("enhanced: {text}\n(approve | approve raw)"),
                            None => {}
                        }
                    }
                });
            }

            "approve" => {
                let use_enhanced = rest != "raw";
                match controller.approve(use_enhanced) {
                    Ok(()) => {
                        if let Some(text) = controller.text_view().approved {
                            println!("approved: {text}");
                        }
                    }
                    Err(e) => println!("approve failed: {e}"),
                }
            }

            "generate" => {
                let ctl = controller.clone();
                tokio::spawn(async move {
                    if report("generate", ctl.generate_from_approved().await) {
                        if let Some(generated) = ctl.text_view().generated {
                            println!("generated image: {}", preview(&generated.image));
                        }
                    }
                });
            }

            "file" => {
                if rest.is_empty() {
                    println!("usage: file <path>");
                    continue;
                }
                let name = Path::new(rest)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| rest.to_string());
                match std::fs::read(rest) {
                    Ok(data) => match controller.set_file(name, Bytes::from(data)) {
                        Ok(()) => println!("file set; caption and variations cleared"),
                        Err(e) => println!("file rejected: {e}"),
                    },
                    Err(e) => println!("cannot read {rest}: {e}"),
                }
            }

            "caption" => {
                let ctl = controller.clone();
                tokio::spawn(async move {
                    if report("caption", ctl.analyze_image().await) {
                        if let Some(caption) = ctl.image_view().caption {
                            println!(
                                "caption:\n{}",
                                serde_json::to_string_pretty(&caption).unwrap_or_default()
                            );
                        }
                    }
                });
            }

            "variations" => {
                let count: usize = rest.parse().unwrap_or(3);
                let ctl = controller.clone();
                tokio::spawn(async move {
                    if report("variations", ctl.generate_variations(count).await) {
                        let variations = ctl.image_view().variations;
                        println!("{} variations:", variations.len());
                        for (i, v) in variations.iter().enumerate() {
                            println!("  {}: {}", i + 1, preview(v));
                        }
                    }
                });
            }

            other => println!("unknown command '{other}', try 'help'"),
        }
    }
    Ok(())
}

/// Prints the committed artifact or the failure. Stale discards print
/// nothing: no user-facing state was eligible to receive them.
fn report(label: &'static str, result: Result<Outcome, WorkflowError>) -> bool {
    match result {
        Ok(Outcome::Committed) => true,
        Ok(Outcome::StaleDiscarded) => false,
        Err(e) => {
            println!("{label} failed: {e}");
            false
        }
    }
}

fn stage_name(stage: TextStage) -> &'static str {
    match stage {
        TextStage::Idle => "idle",
        TextStage::Analyzed => "analyzed",
        TextStage::Enhanced => "enhanced",
        TextStage::Approved => "approved",
        TextStage::Generated => "generated",
    }
}

fn print_state(controller: &WorkflowController) {
    let text = controller.text_view();
    let image = controller.image_view();
    let actions = controller.permitted();

    println!("text pipeline [{}{}]", stage_name(text.stage), if text.busy { ", busy" } else { "" });
    println!("  prompt:   {:?}", text.prompt);
    if let Some(a) = &text.analysis {
        println!("  analysis: {a}");
    }
    if let Some(e) = &text.enhanced {
        println!("  enhanced: {e:?}");
    }
    if let Some(a) = &text.approved {
        println!("  approved: {a:?}");
    }
    if let Some(g) = &text.generated {
        println!("  image:    {} (from {:?})", preview(&g.image), g.approved_text);
    }

    println!("image pipeline{}", if image.busy { " [busy]" } else { "" });
    println!("  file:     {}", image.file_name.as_deref().unwrap_or("(none)"));
    if let Some(c) = &image.caption {
        println!("  caption:  {c}");
    }
    if !image.variations.is_empty() {
        println!("  variations: {}", image.variations.len());
    }

    println!("available: {actions:?}");
}

fn print_help() {
    println!(
        "\
commands:
  prompt <text>     set the working prompt (clears derived artifacts)
  analyze           analyze the prompt
  enhance           request an enhanced prompt
  approve [raw]     approve the enhanced text, or the raw prompt with 'raw'
  generate          generate an image from the approved prompt
  file <path>       select an image file (clears caption and variations)
  caption           analyze the selected image
  variations <n>    generate n variations of the selected image
  show              print pipeline state and available actions
  quit              exit"
    );
}
