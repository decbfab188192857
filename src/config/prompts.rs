//! Prompt builders for every model call the agent makes.
//!
//! The output-format sections are load-bearing: the labels they request
//! are exactly the labels the reply parser recognizes.

/// System prompt for the action-planning conversation.
pub const ACTION_SYSTEM: &str = "You are a helpful AI mobile phone operating assistant. You need \
     to help me operate the phone to complete the user's instruction. Do not allow location \
     sharing and cookies.";

/// System prompt for the screen-captioning conversation.
pub const DESCRIBE_SYSTEM: &str = "You are a helpful AI phone screenshot captioner. I need you to \
     help me describe the phone screenshot in great detail. Describe every UI element you see and \
     is clickable and every text you see. Try to recognize what application is opened now.";

/// System prompt for the reflection (completed-contents) conversation.
pub const PROCESS_SYSTEM: &str = "You are a helpful AI mobile phone operating assistant. You need \
     to help me say what is completed.";

/// System prompt for the memory conversation.
pub const MEMORY_SYSTEM: &str = "You are a helpful AI mobile phone operating assistant.";

/// Default hint text injected into action prompts.
pub const DEFAULT_HINT: &str = "Change (brief description) to proper description of element in \
     output. Look on your history actions, when you are deciding about next action. Do not use \
     the same thoughts in the row. Avoid using the same output.";

/// Request a detailed caption of the current screenshot.
pub const DESCRIBE_REQUEST: &str = "Please describe the screenshot above in details.\n";

/// Evaluator system prompt, web/shopping-flow wording.
pub fn eval_system_web() -> &'static str {
    "You are an expert in evaluating the performance of an android navigation agent. The agent is \
     designed to help a human user navigate the device to complete a task. Given the user's \
     intent, action history, and the state of the screen, your goal is to decide whether the \
     agent has successfully completed the task or not.\n\
     If user cannot complete task, because for example: some product is out of stock. It is \
     success. Select means click, so user has to click to select something. User do not want to \
     click anything, so your purpose is to decide if actual screen shows the final state of the \
     instruction.\n\n\
     *IMPORTANT*\n\
     Format your response into two lines as shown below:\n\n\
     Thoughts: <your thoughts and reasoning process based>\n\
     Status: \"success\" or \"failure\"\n\
     Rate: 1-10 <scale in 1-10 how much convinced are you>\n"
}

/// Evaluator system prompt, general-purpose wording.
pub fn eval_system_general() -> &'static str {
    "You are an expert in evaluating the performance of an android navigation agent. The agent is \
     designed to help a human user navigate the device to complete a task. Given the user's \
     intent, action history, and the state of the screen, your goal is to decide whether the \
     agent has successfully completed the task or not.\n\
     If user cannot complete task, because for example: some product is out of stock. It is \
     success. Select means click, so user has to click to select something.\n\
     *IMPORTANT*\n\
     Format your response into two lines as shown below:\n\
     Thoughts: <your thoughts and reasoning process based>\n\
     Answer: <Answer user intent based on screen caption, if you cannot return N/A.>\n\
     Status: \"success\" or \"failure\"\n\
     Rate: 1-10 <scale in 1-10 how much convinced are you>\n"
}

/// Completion check, web/shopping-flow wording.
pub fn final_eval_web(instruction: &str, action_history: &[String]) -> String {
    format!(
        "\nAll requirements of user intent has to be done to mark action as success. The action \
         history is also important. On the web shopping pages may not be some products then it is \
         also a success, as other products will be displayed and another will be selected.\n\
         User Intent: {instruction}\n\
         Remember whole intent has to be done to mark as success. If user intent is question, you \
         have to be able to answer it based on screen caption.\n\
         Action History:\n{}\n",
        action_history.join("\n")
    )
}

/// Completion check, general-purpose wording.
pub fn final_eval_general(instruction: &str, action_history: &[String]) -> String {
    format!(
        "\nAll requirements of user intent has to be done to mark action as success. Based on \
         actual screen caption you have to decide if user intent is done.\n\
         User Intent: {instruction}\n\
         Action History:\n{}\n",
        action_history.join("\n")
    )
}

/// Prefix a completion check with the captioned screen state.
pub fn with_screen_state(check: &str, caption: &str) -> String {
    format!("The detailed final state of the screen:\n```md\n{caption}\n```\n{check}")
}

/// Wrap the action prompt with the screen caption header passed to the
/// planning endpoint.
pub fn plan_prompt_with_screen(caption: &str, background: &str) -> String {
    format!(
        "### Screenshot Information ###\n\
         This is description of screenshot. You can generate your output based on it.\n\
         {caption}\n\
         ### Background ###\n\
         {background}"
    )
}

fn history_section(thoughts: &[String], summaries: &[String]) -> String {
    let mut section = String::new();
    for (i, (thought, summary)) in thoughts.iter().zip(summaries.iter()).enumerate() {
        let operation = summary.split(" to ").next().unwrap_or(summary).trim();
        section.push_str(&format!(
            "Step-{}: [Thought: {thought};Operation: {operation};]\n",
            i + 1
        ));
    }
    section
}

fn action_vocabulary(keyboard: bool, do_stop: bool, use_open_app: bool) -> String {
    if keyboard {
        return "1. Type (\"typed text\"). Please generate it only with (\"typed text\") nothing \
                else.\n"
            .to_string();
    }
    let mut vocabulary = String::from(
        "1. Click (brief description). Use this command if you want to click somewhere. Please \
         generate it with a brief description of the icon in natural language. You can also click \
         on search boxes, address bars and search bars, if you want start typing, but specify \
         which input should be clicked. Address bar and search bar is not the same thing.\n\
         2. Swipe up-to-bottom/bottom-to-up/left-to-right/right-to-left. Use these commands to \
         drag a page. Choose from 4 options. Use command left-to-right to go one step back if \
         something went wrong.\n\
         3. Home. Exit the app and go back to the desktop.\n\
         4. Type (\"typed text\"). Use this command if you want to click search box/bar/icon or \
         other UI element to type some text. Please generate it only with (\"typed text\") \
         nothing else.\n",
    );
    if use_open_app {
        vocabulary.push_str(
            "5. Go To App - <name of the app>. Use this command if you want to open 3rd party app \
             on the phone. It is the best way to open this app or check if there is app existing \
             on phone. Generate it with name of the app in given format so after ' - '. For \
             example: 'Go To App - Instagram'.\n",
        );
    }
    if do_stop {
        vocabulary
            .push_str("6. STOP. If user command is properly performed, then choose this action\n");
    }
    vocabulary
}

fn output_format_section() -> &'static str {
    "### Output Format ###\n\
     Your output must follow this format on the same line and consists of the following parts:\n\
     Thought: Think about the requirements that have been completed in previous operations and \
     the requirements that need to be completed in the next one operation.\n\
     Action: You can only use one action from the above actions, based on your thought. Change \
     (brief description) to description based on your thought.\n\
     Operation: Please generate a brief natural language description for the operation in Action \
     based on your Thought.\n\
     Command: Please generate a brief natural language description of your Operation. Make it \
     short natural language command.\n\
     Description: Please generate a brief description of UI element you want to click based on \
     your thought, operation and screenshot information. Please do not use ordinal numbers, like \
     'first', 'second'. Be specific with description.\n\
     Ground truth: Please generate a text if you click on search box/bar/address bar etc. which \
     should be written there. Only return text.\n\
     (Use English for the output, return these parts, return output in the same lines)\n"
}

/// Action prompt for the planning call.
#[allow(clippy::too_many_arguments)]
pub fn action_prompt(
    instruction: &str,
    keyboard: bool,
    summaries: &[String],
    thoughts: &[String],
    hint: &str,
    completed: &str,
    memory: &str,
    do_stop: bool,
    use_open_app: bool,
) -> String {
    let mut prompt =
        format!("This image is a phone screenshot. The user's instruction is: {instruction}.\n\n");
    if !hint.is_empty() {
        prompt.push_str("### Hint ###\n");
        prompt.push_str("Hints to help you complete the user's instructions are as follows:\n");
        prompt.push_str(hint);
        prompt.push_str("\n\n");
    }
    if !completed.is_empty() {
        prompt.push_str("### Progress ###\n");
        prompt.push_str(&format!("Completed contents:\n{completed}\n\n"));
    }
    if !thoughts.is_empty() {
        prompt.push_str("### History Operations ###\n");
        prompt.push_str(
            "Refer to the completed operations to decide the next operation. These operations \
             are as follows:\n",
        );
        prompt.push_str(&history_section(thoughts, summaries));
        prompt.push('\n');
    }
    if !memory.is_empty() {
        prompt.push_str("### Memory ###\n");
        prompt.push_str("Recorded contents for use in subsequent operations:\n");
        prompt.push_str(&format!("Memory:\n{memory}\n"));
    }
    prompt.push_str("### Response Requirements ###\n");
    prompt.push_str("You must choose one of the following actions on the current page:\n");
    prompt.push_str(&action_vocabulary(keyboard, do_stop, use_open_app));
    prompt.push_str(output_format_section());
    prompt
}

/// Action prompt variant used when the analysis module is on: the model
/// additionally sees the per-step analysis history and is reminded that
/// past steps may have gone wrong.
#[allow(clippy::too_many_arguments)]
pub fn action_prompt_with_analysis(
    instruction: &str,
    keyboard: bool,
    summaries: &[String],
    thoughts: &[String],
    analyses: &[String],
    hint: &str,
    completed: &str,
    memory: &str,
    do_stop: bool,
    use_open_app: bool,
) -> String {
    let mut prompt = String::from("### Background ###\n");
    prompt.push_str(&format!(
        "This image is a phone screenshot. The user's end goal instruction is: {instruction}. \
         Analyze this instruction step by step, think about where to do this task and what is \
         the exact goal.\n\n"
    ));
    if !hint.is_empty() {
        prompt.push_str("### Hint ###\n");
        prompt.push_str("Hints to help you complete the user's instructions are as follows:\n");
        prompt.push_str(hint);
        prompt.push_str("\n\n");
    }
    prompt.push_str(must_follow_rules());
    if !thoughts.is_empty() {
        prompt.push_str("### History Operations ###\n");
        prompt.push_str(
            "Refer to thoughts of agent doing those operations and tasks that agent was given \
             for each step. Remember that agent could do those tasks wrong, so it is not sure \
             that those tasks were done correctly. Refer to analysis part to check if those \
             tasks were done correctly:\n",
        );
        prompt.push_str(&history_section(thoughts, summaries));
        prompt.push('\n');
    }
    if !analyses.is_empty() {
        prompt.push_str("### Given agent operations analysis history ###\n");
        prompt.push_str(
            "Refer to the analysis of operations done by agent. These operations are as \
             follows:\n",
        );
        for (i, analysis) in analyses.iter().enumerate() {
            prompt.push_str(&format!(
                "Step-{}: [Analysis of operation done by agent: {}\n",
                i + 1,
                analysis.trim()
            ));
        }
        prompt.push('\n');
    }
    if !completed.is_empty() {
        prompt.push_str("### Progress ###\n");
        prompt.push_str(&format!("Completed contents:\n{completed}\n\n"));
    }
    if !memory.is_empty() {
        prompt.push_str("### Memory ###\n");
        prompt.push_str(&format!("Memory:\n{memory}\n"));
    }
    prompt.push_str("### Response Requirements ###\n");
    prompt.push_str("You must choose one of the following actions on the current page:\n");
    prompt.push_str(&action_vocabulary(keyboard, do_stop, use_open_app));
    prompt.push_str(output_format_section());
    prompt
}

fn must_follow_rules() -> &'static str {
    "### Must follow rules ###\n\
     You are always responsible for searching for items to click. Always be specific about what \
     to click at. Never trigger click action if you do not see element on screen.\n\
     Focus on purpose of task, analyse it step by step. When question is about some information \
     extraction, then return data that is answering question in 'answer' when successful.\n\
     If you are given to do task in app, then look for it in phone, those can be installed. \
     Never look for apps on google.\n\
     You have to do exactly what is told to you. If instruction says to do some actions in \
     specific app then you must do this in this specific app. Never do things in other way.\n"
}

/// Prompt judging whether the previous action made progress, from the
/// before/after screenshot pair.
pub fn analysis_prompt(instruction: &str, action: &str, analyses: &[String]) -> String {
    let mut prompt = String::from(
        "You are provided with two phone screenshots: one taken before the operation and one \
         taken after. Additionally, you have:\n\
         - A global instruction for the entire operation.\n\
         - A specific task to complete between the two screenshots.\n\
         - An analysis history of previous steps.\n\n\
         Your job is to carefully analyze the two screenshots and determine if any progress has \
         been made according to the global instruction and the specific task.\n\n\
         Focus on the following:\n\n\
         1. **Task Progress**: Does the difference between the two screenshots indicate that the \
         current task has been completed?\n\
         2. **Correctness**: Was the correct task performed? If the task was misinterpreted, \
         highlight that error.\n\
         3. **Global Instruction Alignment**: Are the changes in line with the global \
         instruction, even if the task itself isn't fully complete?\n\n\
         ### Analysis History ###\n",
    );
    for (i, analysis) in analyses.iter().enumerate() {
        prompt.push_str(&format!(
            "Step-{}: [Analysis of given step: {}]\n\n",
            i + 1,
            analysis.trim()
        ));
    }
    prompt.push_str(&format!(
        "### Current Operation ###\n\
         - **Global Instruction**: {instruction}\n\
         - **Current Task**: {action}\n\n\
         ### Output Format ###\n\
         Your analysis should be presented in the following format:\n\n\
         Analysis: Write 'Done Correctly' or 'Done Incorrectly' which tells if current task was \
         done correctly or not and after that, splitted using this symbol ' - ' generate a brief \
         natural language analysis of situation. **Note**: Your analysis should focus on the \
         correctness of the **current task**, not whether the entire global instruction is \
         completed."
    ));
    prompt
}

/// Prompt asking whether the current screen carries content worth noting.
pub fn memory_prompt(insights: &[String]) -> String {
    let mut prompt = String::new();
    if !insights.is_empty() {
        prompt.push_str("### Important content ###\n");
        prompt.push_str(&insights.join(" "));
        prompt.push_str("\n\n### Response requirements ###\n");
        prompt.push_str(
            "Please think about whether there is any content closely related to ### Important \
             content ### on the current page? If there is, please output the content. If not, \
             please output \"None\".\n\n",
        );
    } else {
        prompt.push_str("### Response requirements ###\n");
        prompt.push_str(
            "Please think about whether there is any content closely related to user's \
             instruction on the current page? If there is, please output the content. If not, \
             please output \"None\".\n\n",
        );
    }
    prompt.push_str(
        "### Output format ###\n\
         Your output format is:\n\
         Important content: The content or None. Please do not repeatedly output the information \
         in ### Memory ###.",
    );
    prompt
}

/// Prompt asking the model to update the running "completed contents"
/// summary from the full history.
pub fn process_prompt(
    instruction: &str,
    thoughts: &[String],
    summaries: &[String],
    actions: &[String],
    completed: &str,
    hint: &str,
) -> String {
    let mut prompt = String::from("### Background ###\n");
    prompt.push_str(&format!(
        "There is an user's instruction which is: {instruction}. You are a mobile phone \
         operating assistant and are operating the user's mobile phone.\n\n"
    ));
    if !hint.is_empty() {
        prompt.push_str("### Hint ###\n");
        prompt.push_str(
            "There are hints to help you complete the user's instructions. The hints are as \
             follow:\n",
        );
        prompt.push_str(hint);
        prompt.push_str("\n\n");
    }
    if thoughts.len() > 1 {
        prompt.push_str("### History operations ###\n");
        prompt.push_str(
            "To complete the requirements of user's instruction, you have performed a series of \
             operations. These operations are as follow:\n",
        );
        for (i, summary) in summaries.iter().enumerate() {
            let operation = summary.split(" to ").next().unwrap_or(summary).trim();
            let action = actions.get(i).map(String::as_str).unwrap_or("");
            prompt.push_str(&format!(
                "Step-{}: [Operation thought: {operation}; Operation action: {action}]\n",
                i + 1
            ));
        }
        prompt.push_str(&format!(
            "\n### Progress thinking ###\n\
             After completing the history operations, you have the following thoughts about the \
             progress of user's instruction completion:\n\
             Completed contents:\n{completed}\n\n\
             ### Response requirements ###\n\
             Now you need to update the \"Completed contents\". Completed contents is a general \
             summary of the current contents that have been completed based on the ### History \
             operations ###.\n\n\
             ### Output format ###\n\
             Your output format is:\n\
             Completed contents:\nUpdated Completed contents. Don't output the purpose of any \
             operation. Just summarize the contents that have been actually completed in the ### \
             History operations ###."
        ));
    } else {
        let thought = thoughts.last().map(String::as_str).unwrap_or("");
        let operation = summaries
            .last()
            .map(|s| s.split(" to ").next().unwrap_or(s).trim())
            .unwrap_or("");
        prompt.push_str(&format!(
            "### Current operation ###\n\
             To complete the requirements of user's instruction, you have performed an \
             operation. Your operation thought and action of this operation are as follows:\n\
             Operation thought: {thought}\n\
             Operation action: {operation}\n\n\
             ### Response requirements ###\n\
             Now you need to combine all of the above to generate the \"Completed contents\".\n\
             Completed contents is a general summary of the current contents that have been \
             completed. You need to first focus on the requirements of user's instruction, and \
             then summarize the contents that have been completed.\n\n\
             ### Output format ###\n\
             Your output format is:\n\
             Completed contents: Generated Completed contents. Don't output the purpose of any \
             operation. Just summarize the contents that have been actually completed in the ### \
             Current operation ###. Look on the current screenshot if operation was not properly \
             executed, do not take this operation as completed.\n\
             (Please use English to output)"
        ));
    }
    prompt
}

/// Prompt resolving a requested app name against the installed-app labels.
pub fn relevant_app_prompt(app_name: &str, labels: &[String]) -> String {
    format!(
        "Return app that is relevant from app list that is the nearest to the search app\n\n\
         search app: {app_name}\n\n\
         app list:\n{}\n\n\
         Return answer in given format below:\n\n\
         app: <return exact name of the app from app list that is relevant to search app>\n",
        labels.join("\n")
    )
}
