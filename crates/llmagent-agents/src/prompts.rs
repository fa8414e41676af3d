//! System preamble and the fixed instructions injected during a turn.

pub const TOOL_DIRECTIVE: &str = "CRITICAL: You have function/tool calling capability via the API. \
When you need a tool, use the API's native tool calling feature. Never write text that describes \
or imitates tool usage; the system runs tools and shows their output itself.\n\n";

pub const TOOL_CAPABILITY: &str = "\n\n## TOOL CALLING CAPABILITY\n\n\
You can call tools through the API's native function calling feature.\n\n\
When executing tools:\n\
- Use the tool calling feature, not text descriptions\n\
- Do not write text that imitates tool execution such as 'Success: git_status()'\n\
- Do not print headers like 'Tool Execution' or 'Calling tool: X'\n\
- The system runs every call and displays the results\n";

pub const PLANNING_WORKFLOW: &str = "
## AGENT WORKFLOW

Work in phases.

### PHASE 1: PLANNING (for every new request)
1. Work out what the user is trying to achieve
2. Decide the steps and the tools each step needs
3. Present the plan in exactly this format:

```
GOAL: [What we are trying to achieve]

PLAN:
1. [First step, naming its tool, e.g. \"Check repository status (git_status)\"]
2. [Second step]
3. [...]

TOOLS REQUIRED: [Tool names, e.g. git_status, git_diff, git_commit]

ESTIMATED STEPS: [Number]
```

4. Present ONLY the plan. Do not call any tools yet.
5. Wait for approval.

### PHASE 2: EXECUTION (after approval)
1. Respond with tool calls only, no text
2. After each result, check whether the plan still holds
3. If it does not, present a new plan marked '= REVISED PLAN' at the top, explain what changed, and wait for approval
4. Otherwise make the next tool call
5. Continue until every step is done

### PHASE 3: COMPLETION
1. Confirm the goal was reached
2. Summarize what was done

Rules:
- Always plan first for a new request
- Never run tools before a plan is approved
- While executing, send tool calls without text; the system shows progress
- Never imitate tool output or separator lines
";

pub const DIRECT_EXECUTION: &str = "\n## DIRECT EXECUTION MODE\n\n\
- Plan approval is disabled\n\
- Do not present plans or announce what you are about to do\n\
- Your first response must contain only tool calls\n\
- Call the required tools immediately\n\
- Once the tools finish you may briefly summarize the results\n";

pub const EXECUTE_STEP_ONE: &str = "Plan approved. Execute step 1 now.\n\n\
CRITICAL INSTRUCTIONS:\n\
- Your response must contain ONLY the tool call for step 1\n\
- Do NOT write any text content\n\
- Do NOT output headers like 'Tool Execution', '======' or 'Step 1:'\n\
- The system displays tool progress automatically\n\
- After the tool completes you will see its result and can continue with the next step";

/// User message asking the model to rework its plan.
pub fn revision_request(feedback: &str) -> String {
    format!(
        "Please present a REVISED PLAN based on this feedback: {feedback}\n\n\
         Mark it clearly with '= REVISED PLAN' at the top."
    )
}

/// Inputs of one system preamble.
#[derive(Debug, Clone, Default)]
pub struct Preamble<'a> {
    pub persona: &'a str,
    pub lang: Option<&'a str>,
    /// Tools are enabled and the provider can call them.
    pub tools: bool,
    pub require_plan_approval: bool,
    pub context: Option<&'a str>,
    pub summary: Option<&'a str>,
    pub plan: Option<&'a str>,
}

impl Preamble<'_> {
    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.tools {
            out.push_str(TOOL_DIRECTIVE);
        }
        out.push_str(self.persona);
        if let Some(lang) = self.lang {
            out.push_str(&format!(" And respond in {lang}."));
        }
        if let Some(context) = self.context {
            out.push_str(&format!("\n\n## Project Context\n\n{context}"));
        }
        if let Some(summary) = self.summary {
            out.push_str(&format!(
                "\n\n## Conversation Summary & User Preferences\n\n{summary}"
            ));
        }
        if let Some(plan) = self.plan {
            out.push_str(&format!(
                "\n\n## Current Active Plan\n\nYou previously created and the user approved this plan. \
                 Continue executing it:\n\n{plan}"
            ));
        }
        if self.tools {
            out.push_str(TOOL_CAPABILITY);
            out.push_str(if self.require_plan_approval {
                PLANNING_WORKFLOW
            } else {
                DIRECT_EXECUTION
            });
        }
        out
    }
}

/// Fresh or extending summarization request for `conversation`.
pub fn summary_request(existing: Option<&str>, conversation: &str, plan_stored: bool) -> String {
    let mut out = match existing {
        Some(existing) => format!(
            "Here is the existing conversation summary:\n\n```markdown\n{existing}\n```\n\n\
             And here is the new conversation to add to the summary:\n\n```\n{conversation}\n```\n\n\
             Please extend the existing summary with insights from the new conversation.\n\
             Keep all the existing content and only ADD new topics, preferences, and action items.\n\
             Do NOT re-summarize or remove existing content."
        ),
        None => format!(
            "Here is a conversation history to summarize:\n\n```\n{conversation}\n```\n\n\
             Please create a comprehensive summary of this conversation."
        ),
    };
    out.push_str(
        "\n\nGenerate a summary using this format:\
         \n\n# Conversation Summary\
         \n\n## Key Topics Discussed\
         \n[Bullet points of main topics and decisions made]\
         \n\n## Important Information to Remember\
         \n[Critical details, decisions, or context that should be retained]\
         \n\n## User Preferences\
         \n- Coding style preferences\
         \n- Tool or technology preferences\
         \n- Communication preferences\
         \n- Project-specific conventions\
         \n\n## Action Items\
         \n[Any pending tasks or future work mentioned]",
    );
    out.push_str(if plan_stored {
        "\n\nNOTE: An active plan is stored separately. Do NOT include it in the summary."
    } else {
        "\n\nNOTE: Plans are stored separately and must NOT be included in the summary."
    });
    out.push_str("\n\nReply with the summary markdown only.");
    out
}
