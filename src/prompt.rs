// src/prompt.rs
//
// Fixed few-shot prompt for turning a free-text scenario description into
// the structured textual IR. The system instruction walks the model through
// the derivation step by step and pins the output schema; two worked
// examples anchor the format. The final YAML must arrive between <YAML> and
// </YAML> markers so it can be cut out of the surrounding reasoning.

use crate::llm_client::ChatMessage;

const SYSTEM_INSTRUCTION: &str = r#"
You will work as an autonomous driving system testing engineer. Your task is to derive a test traffic scenario from the given traffic scenario description.

Approach this task step-by-step, take your time, and do not skip steps.

Step 1: Derive the `weather` element of the test scenario. The weather could be one option in `[clear, cloudy, foggy, rainy, snowy]`. If the weather is not explicitly mentioned in the description, use the default `clear`. If no option matches, choose the most similar one.

Step 2: Derive the `time` of the test scenario. The time could be one option in `[daytime, nighttime]`. If the time is not explicitly mentioned, use the default `daytime`. If no option matches, choose the most similar one.

Step 3: Derive the `road_network` element, containing `road_type`, `traffic_sign`, `traffic_light` and `lane_number`. The `road_type` could be one of `[intersection, t-intersection, roundabout]`. The `traffic_light` could be one of `[green, red]`. The `traffic_sign` could be one of `[stop sign, speed limit sign]`; if no option matches, create a new option yourself. For `lane_number`, output the number of lanes in the road, or `None` when it is not explicitly mentioned. Note that `traffic_light` and `traffic_sign` are not always present and do not usually appear in the same scenario.

Step 4: Derive the `current_behavior`, `position_target`, `position_relation`, and `speed` for the ego vehicle. The `current_behavior` could be one option in `[go forward, yield, stop, turn left, turn right, change lane to left, change lane to right]`; default to `go forward` when unmentioned. The `position_target` is one of the road network elements obtained in Step 3, and `position_relation` describes the relative position between the ego vehicle and the position target, one of `[front, behind, left, right, opposite, left behind, right behind, left front, right front]`. The `speed` is in the format `30 mph` or `30 km/h`, or `None` when not indicated. Organize the information in YAML with `ego_vehicle` as the key.

Step 5: Identify all actors other than the ego vehicle. For each actor derive `type` (one of `[car, truck, pedestrian, bus, cyclist]`), `current_behavior`, `position_target`, `position_relation`, and `speed`, as in Step 4. The `position_target` of other actors can be `ego vehicle`, one of the other actors, or one of the road network elements. Organize the information in YAML with `other_actor_1`, `other_actor_2`, etc. as the keys.

Step 6: Save all elements obtained above to a YAML document, following the syntax below. The final YAML output must start with `<YAML>` and end with `</YAML>`.
<YAML>
environment:
    weather:
    time:
road_network:
    road_type:
    traffic_sign:
    traffic_light:
    lane_number:
participant:
    ego_vehicle:
        current_behavior:
        position_target:
        position_relation:
        speed:
    other_actor_1:
        type:
        current_behavior:
        position_target:
        position_relation:
        speed:
    ...
</YAML>
"#;

const EXAMPLE_DESCRIPTION_1: &str = r#"
It is currently daytime with partly cloudy skies.
Our ego vehicle is driving on the third lane from the left on a five-lane road at the speed of 30 mph.
There are pedestrians crossing at the intersection directly ahead of it.
There is a black sedan in front of the ego vehicle in the right lane, going forward at the speed of 45 mph.
There are cars driving in front of the ego vehicle in both left two lanes, going forward at the speed of 35 mph.
The traffic light for the direction of the ego vehicle is currently green.
"#;

const EXAMPLE_OUTPUT_1: &str = r#"
Step 1: The `weather` is described as `partly cloudy`, which is not a candidate option; the most similar option is `cloudy`.
Output of Step 1: `weather: cloudy`

Step 2: The `time` is explicitly `daytime`.
Output of Step 2: `time: daytime`

Step 3: The `road_type` is `intersection`. The `traffic_sign` is not mentioned, hence `None`. The `traffic_light` is `green`. The `lane_number` is `5`.

Step 4: The ego vehicle goes forward at `30 mph`. The intersection is directly ahead of it, so the ego vehicle is `behind` the intersection.

Step 5: `other_actor_1` is the crossing pedestrian, ahead of the ego vehicle. `other_actor_2` is the black sedan, `right front` of the ego vehicle at `45 mph`. `other_actor_3` stands for the cars on the left lanes, `left front` of the ego vehicle at `35 mph`.

Step 6: Save all elements obtained above to the following YAML format:
<YAML>
environment:
    weather: cloudy
    time: daytime
road_network:
    road_type: intersection
    traffic_sign: None
    traffic_light: green
    lane_number: 5
participant:
    ego_vehicle:
        current_behavior: go forward
        position_target: intersection
        position_relation: behind
        speed: 30 mph
    other_actor_1:
        type: pedestrian
        current_behavior: crossing
        position_target: ego vehicle
        position_relation: front
        speed: None
    other_actor_2:
        type: car
        current_behavior: go forward
        position_target: ego vehicle
        position_relation: right front
        speed: 45 mph
    other_actor_3:
        type: car
        current_behavior: go forward
        position_target: ego vehicle
        position_relation: left front
        speed: 35 mph
</YAML>
"#;

const EXAMPLE_DESCRIPTION_2: &str = r#"
It is currently at night with clear visibility.
Our ego vehicle is driving on the second lane from the left on a four-lane road at a speed of 25 mph.
There are pedestrians crossing at the intersection directly ahead of it at the speed of 3 mph.
There is a white sedan in front of the ego vehicle in the left lane, going forward, at the speed of 30 mph.
There are cars driving in front of the ego vehicle in both right two lanes, going forward, at the speed of 35 mph.
There is a stop sign at the intersection.
"#;

const EXAMPLE_OUTPUT_2: &str = r#"
Step 1: "with clear visibility" matches the `clear` option.
Output of Step 1: `weather: clear`

Step 2: The `time` is `night`, matching the `nighttime` option.
Output of Step 2: `time: nighttime`

Step 3: The `road_type` is `intersection`, the `traffic_sign` is `stop sign`, the `traffic_light` is not mentioned, and the `lane_number` is `4`.

Step 4: The ego vehicle goes forward at `25 mph`, `behind` the intersection that is directly ahead.

Step 5: `other_actor_1` is the crossing pedestrian at `3 mph`. `other_actor_2` is the white sedan, `left front` of the ego vehicle at `30 mph`. `other_actor_3` stands for the cars on the right lanes, `right front` of the ego vehicle at `35 mph`.

Step 6: Save all elements obtained above to the following YAML format:
<YAML>
environment:
    weather: clear
    time: nighttime
road_network:
    road_type: intersection
    traffic_sign: stop sign
    traffic_light: None
    lane_number: 4
participant:
    ego_vehicle:
        current_behavior: go forward
        position_target: intersection
        position_relation: behind
        speed: 25 mph
    other_actor_1:
        type: pedestrian
        current_behavior: crossing
        position_target: ego vehicle
        position_relation: front
        speed: 3 mph
    other_actor_2:
        type: car
        current_behavior: go forward
        position_target: ego vehicle
        position_relation: left front
        speed: 30 mph
    other_actor_3:
        type: car
        current_behavior: go forward
        position_target: ego vehicle
        position_relation: right front
        speed: 35 mph
</YAML>
"#;

/// The full few-shot message list for one scenario description. The caller
/// may extend the final user turn with a reference image attachment.
pub fn scene_prompt(description: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::text("system", SYSTEM_INSTRUCTION),
        ChatMessage::text("user", EXAMPLE_DESCRIPTION_1),
        ChatMessage::text("assistant", EXAMPLE_OUTPUT_1),
        ChatMessage::text("user", EXAMPLE_DESCRIPTION_2),
        ChatMessage::text("assistant", EXAMPLE_OUTPUT_2),
        ChatMessage::text("user", description),
    ]
}
