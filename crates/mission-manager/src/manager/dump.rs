use mission_core::ElementName;

use super::MissionListManager;
use crate::ability_record::AbilityState;
use crate::mission_list::ListKey;

/// Snapshot of one running ability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbilityRunningInfo {
    pub element: ElementName,
    pub state: AbilityState,
    pub start_time_ms: u64,
    pub uid: i32,
}

impl MissionListManager {
    /// Every ability currently tracked in a mission list.
    pub fn get_ability_running_infos(&self) -> Vec<AbilityRunningInfo> {
        self.search_order()
            .into_iter()
            .filter_map(|list| self.lists.get(list))
            .flat_map(|list| list.missions())
            .filter_map(|mission| self.missions.get(mission))
            .filter_map(|mission| self.records.get(mission.ability))
            .map(|record| AbilityRunningInfo {
                element: record.want.element.clone(),
                state: record.state,
                start_time_ms: record.start_time_ms,
                uid: record.uid(),
            })
            .collect()
    }

    /// Human-readable dump of the whole session.
    pub fn dump(&self) -> Vec<String> {
        let mut lines = vec![format!("User ID #{}", self.config.user_id)];
        lines.push("current mission lists:{".to_string());
        for list in &self.current_lists {
            self.dump_list(*list, &mut lines);
        }
        lines.push("}".to_string());
        lines.push("default stand mission list:{".to_string());
        self.dump_list(self.default_standard_list, &mut lines);
        lines.push("}".to_string());
        lines.push("default single mission list:{".to_string());
        self.dump_list(self.default_single_list, &mut lines);
        lines.push("}".to_string());
        lines.push("launcher mission list:{".to_string());
        self.dump_list(self.launcher_list, &mut lines);
        lines.push("}".to_string());
        lines.push("terminate list:{".to_string());
        for token in &self.terminate_list {
            if let Some(record) = self.records.get(*token) {
                lines.push(format!("  {}", record.dump_line()));
            }
        }
        lines.push("}".to_string());
        lines.push(format!("waiting queue size #{}", self.waiting_queue.len()));
        lines
    }

    /// Dump of the single mission `mission_id`, empty when it is not listed.
    pub fn dump_mission(&self, mission_id: i32) -> Vec<String> {
        let Some(mission) = self
            .find_mission_by_id(mission_id)
            .and_then(|key| self.missions.get(key))
        else {
            return Vec::new();
        };
        let mut lines = vec![format!(
            "Mission ID #{} mission name #[{}] lockedState #{}",
            mission.mission_id, mission.mission_name, mission.locked
        )];
        if let Some(record) = self.records.get(mission.ability) {
            lines.push(format!("  {}", record.dump_line()));
        }
        lines
    }

    fn dump_list(&self, list: ListKey, lines: &mut Vec<String>) {
        let Some(entry) = self.lists.get(list) else {
            return;
        };
        lines.push(format!("  MissionList Type #{}", entry.list_type().as_str()));
        for mission in entry.missions() {
            let Some(mission) = self.missions.get(mission) else {
                continue;
            };
            lines.push(format!(
                "    Mission ID #{} mission name #[{}] lockedState #{}",
                mission.mission_id, mission.mission_name, mission.locked
            ));
            if let Some(record) = self.records.get(mission.ability) {
                lines.push(format!("      {}", record.dump_line()));
            }
        }
    }
}
