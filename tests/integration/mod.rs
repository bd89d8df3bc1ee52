mod gui_grafts;
